pub mod counter;
pub mod progress;
pub mod store;


pub use counter::AddressCounter;
pub use progress::ProgressTracker;
pub use store::TransactionStore;
