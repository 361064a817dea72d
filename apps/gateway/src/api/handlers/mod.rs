pub mod ccda;
pub mod direct;
pub mod fhir;
pub mod health;
pub mod networks;
pub mod transactions;
pub mod x12;
