pub mod operation_gap;
pub mod threshold_window;
