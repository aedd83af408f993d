//! Private utility functions used internally within `nrf52-flash`.

pub mod align;
