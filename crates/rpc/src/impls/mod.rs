mod deluge;
mod qbittorrent;
mod transmission;
mod utorrent;

pub use deluge::Deluge;
pub use qbittorrent::QBittorrent;
pub use transmission::Transmission;
pub use utorrent::UTorrent;
