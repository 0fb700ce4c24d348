pub mod quadrature;
pub mod sequence;
