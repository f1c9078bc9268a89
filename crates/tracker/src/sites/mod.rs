mod anidub;
mod anilibria;
mod casstudio;
mod eniahd;
mod kinozal;
mod nnmclub;
mod rutor;
mod rutracker;
mod ytsmx;

pub use anidub::AniDub;
pub use anilibria::Anilibria;
pub use casstudio::CasStudio;
pub use eniahd::EniaHd;
pub use kinozal::Kinozal;
pub use nnmclub::NnmClub;
pub use rutor::Rutor;
pub use rutracker::Rutracker;
pub use ytsmx::Ytsmx;
