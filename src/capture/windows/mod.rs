//! Windows screen capture implementation

mod duplication;

pub use duplication::{DxgiBackend, DxgiDuplication, DxgiStaging};
