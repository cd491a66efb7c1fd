pub mod models;
pub mod spotdl;
pub mod traits;
pub mod yandex;

pub use models::{DownloadRequest, Platform, TrackInfo};
pub use spotdl::SpotdlSource;
pub use traits::TrackSource;
pub use yandex::{CatalogConnector, MusicCatalog, YandexClient, YandexConnector, YandexSource};
