pub mod auth;
pub mod character;
pub mod dice;
pub mod error;
pub mod history;
pub mod inventory;
pub mod lens;
pub mod logging;
pub mod preferences;
pub mod session;
pub mod settings;
pub mod sheet;
pub mod shell;
pub mod store;
pub mod utils;

// Re-export commonly used items for easier access
pub use character::{
    Ability, AbilityType, Bars, CharacterSheet, Condition, InventoryItem, Pool, Stats,
};
pub use dice::{DieRoller, DieType, RollOutcome, RollRequest};
pub use error::{AppError, ResourceError, StoreError, ValidationError};
pub use history::RollRecord;
pub use session::Session;
pub use store::{DocumentStore, FileStore, MemoryStore, Snapshot};
