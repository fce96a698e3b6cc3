pub mod none_one_or_many;
pub mod one_or_many;

pub use none_one_or_many::NoneOneOrMany;
pub use one_or_many::OneOrMany;
