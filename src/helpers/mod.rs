pub mod aggregate;
pub mod email;
pub mod pdf;
pub mod source;
pub mod workbook;
