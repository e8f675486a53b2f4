//! Inventory ledger, cart store and order journal.
//!
//! The crate owns the three tables that the fulfillment saga mutates and
//! exposes them only through transactional engines:
//!
//! - [`ReservationEngine`] moves cart lines into the order journal after
//!   checking availability (`place`) and undoes that move
//!   (`compensate_place`).
//! - [`FinalizationEngine`] decrements stock and clears the cart
//!   (`finalize`) and restores both (`compensate_finalize`).
//! - [`CartStore`] handles the client-facing cart operations.
//!
//! Every engine runs against the [`Ledger`] trait, implemented by
//! [`InMemoryLedger`] and [`PostgresLedger`]. Each transaction locks the
//! product rows it touches, in ascending product order, before reading or
//! writing them.

pub mod cart;
pub mod error;
pub mod finalization;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod reservation;

pub use cart::CartStore;
pub use error::{InventoryError, Result};
pub use finalization::FinalizationEngine;
pub use ledger::{ApplyOutcome, Ledger, LedgerTx};
pub use locks::{KeyedLocks, ProductLocks};
pub use memory::InMemoryLedger;
pub use model::{CartLine, OrderLine, Product};
pub use postgres::PostgresLedger;
pub use reservation::ReservationEngine;
