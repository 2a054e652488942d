//! Ordered reference tables cycled per requester.

use crate::pipeline::types::CorrespondenceType;

/// Maxims of equity, in rotation order.
pub const MAXIMS: &[&str] = &[
    "Equity regards as done that which ought to be done.",
    "He who seeks equity must do equity.",
    "He who comes into equity must come with clean hands.",
    "Equity will not suffer a wrong to be without a remedy.",
    "Equity looks to the intent rather than to the form.",
    "Equity follows the law.",
    "Delay defeats equity.",
    "Equality is equity.",
    "Equity acts in personam.",
    "Where the equities are equal, the law prevails.",
];

const COUNCIL_TAX_CASES: &[&str] = &[
    "R v Highbury Corner Magistrates' Court, ex parte Uchendu (1994) RA 51",
    "Entick v Carrington (1765) 19 St Tr 1029",
    "Ridge v Baldwin [1964] AC 40",
];

const ENERGY_CASES: &[&str] = &[
    "Ferguson v British Gas Trading Ltd [2009] EWCA Civ 46",
    "Interfoto Picture Library Ltd v Stiletto Visual Programmes Ltd [1989] QB 433",
    "Thornton v Shoe Lane Parking Ltd [1971] 2 QB 163",
];

const WATER_CASES: &[&str] = &[
    "Marcic v Thames Water Utilities Ltd [2003] UKHL 66",
    "Interfoto Picture Library Ltd v Stiletto Visual Programmes Ltd [1989] QB 433",
];

const DEBT_COLLECTION_CASES: &[&str] = &[
    "Semayne's Case (1604) 5 Co Rep 91a",
    "Ferguson v British Gas Trading Ltd [2009] EWCA Civ 46",
    "Entick v Carrington (1765) 19 St Tr 1029",
    "Vine v Waltham Forest LBC [2000] 1 WLR 2383",
];

const SOLICITOR_CASES: &[&str] = &[
    "Hedley Byrne & Co Ltd v Heller & Partners Ltd [1964] AC 465",
    "Ridge v Baldwin [1964] AC 40",
];

const BANK_FINANCE_CASES: &[&str] = &[
    "Director General of Fair Trading v First National Bank plc [2001] UKHL 52",
    "Royal Bank of Scotland plc v Etridge (No 2) [2001] UKHL 44",
    "Office of Fair Trading v Abbey National plc [2009] UKSC 6",
];

const LOCAL_AUTHORITY_CASES: &[&str] = &[
    "Associated Provincial Picture Houses Ltd v Wednesbury Corporation [1948] 1 KB 223",
    "Kruse v Johnson [1898] 2 QB 91",
    "Vine v Waltham Forest LBC [2000] 1 WLR 2383",
];

const GENERAL_CASES: &[&str] = &[
    "Carlill v Carbolic Smoke Ball Co [1893] 1 QB 256",
    "Donoghue v Stevenson [1932] AC 562",
    "Keech v Sandford (1726) Sel Cas Ch 61",
    "Saunders v Vautier (1841) 4 Beav 115",
];

/// Case-law list for a correspondence type. Never empty.
pub fn case_law_for(kind: CorrespondenceType) -> &'static [&'static str] {
    match kind {
        CorrespondenceType::CouncilTax => COUNCIL_TAX_CASES,
        CorrespondenceType::Energy => ENERGY_CASES,
        CorrespondenceType::Water => WATER_CASES,
        CorrespondenceType::DebtCollection => DEBT_COLLECTION_CASES,
        CorrespondenceType::Solicitor => SOLICITOR_CASES,
        CorrespondenceType::BankFinance => BANK_FINANCE_CASES,
        CorrespondenceType::LocalAuthority => LOCAL_AUTHORITY_CASES,
        CorrespondenceType::General => GENERAL_CASES,
    }
}
