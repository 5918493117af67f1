pub mod analyze;
pub mod explore;

pub use analyze::AnalyzeArgs;
pub use explore::ExploreArgs;
