pub mod course;

pub use course::{
    encode_emi_options, parse_emi_options, Course, EmiOption, StoredEmiOption, MAX_EMI_MONTHS,
};
