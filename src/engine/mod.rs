//! Core engine: the opportunity book, the session ledger and the service
//! that runs the detect → sweep → merge cycle over them.

pub mod book;
pub mod ledger;
pub mod service;

pub use book::{OpportunityBook, OpportunityFilter, OpportunityStats};
pub use ledger::{BetReceipt, PlacedBet, Session};
pub use service::OpportunityService;
