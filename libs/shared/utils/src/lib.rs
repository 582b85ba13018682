pub mod dates;
pub mod reference;
pub mod test_utils;
