pub mod params;
pub mod replay;
