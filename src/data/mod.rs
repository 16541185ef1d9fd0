/// Загрузка, очистка и исследование данных

pub mod exploration;
pub mod source;
pub mod synthetic;
pub mod table;

pub use exploration::{CorrelationPair, DatasetProfile, FeatureSummary};
pub use source::DataSource;
pub use synthetic::SyntheticSpec;
pub use table::RawTable;
