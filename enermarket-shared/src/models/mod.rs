pub mod classification;
pub mod filter;
pub mod offer;
pub mod page;
pub mod purchase;
