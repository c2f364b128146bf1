pub mod carts;
pub mod checkout;
pub mod gateways;
pub mod orders;
pub mod payments;
pub mod stock;
pub mod vouchers;
