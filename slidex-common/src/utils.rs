pub mod fsutils;
pub mod percent;
pub mod time;
