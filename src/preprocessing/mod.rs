/// Модуль предобработки данных

pub mod balance;
pub mod scaling;
pub mod selection;
pub mod split;

pub use balance::{oversample_minority, BalanceSummary};
pub use scaling::MinMaxScaler;
pub use selection::{FeatureScore, FeatureSelector};
pub use split::{stratified_split, Split, SplitSummary};
