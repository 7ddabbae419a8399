pub mod spherical;
pub mod svd;
pub mod vector;
