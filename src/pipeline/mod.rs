pub mod phi;
pub mod validation;
