pub mod attributes;
pub mod engine;
pub mod images;
pub mod normalize;
pub mod price;
pub mod resolver;
pub mod variations;

pub use attributes::AttributeResolver;
pub use engine::{SyncEngine, SYNC_DATE_FORMAT};
pub use images::{ImageSyncOutcome, ImageSynchronizer};
pub use price::PriceConverter;
pub use resolver::EntityResolver;
pub use variations::{VariationOutcome, VariationSynchronizer};
