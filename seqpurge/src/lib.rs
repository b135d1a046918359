pub mod adapter;
pub mod error;
pub mod io;
pub mod job;
pub mod params;
pub mod pipeline;
pub mod probability;
pub mod qc;
pub mod reader;
pub mod stats;
pub mod trim;
pub mod trimmer;
pub mod utils;
pub mod writer;

pub use error::TrimError;
pub use params::RunParameters;
pub use pipeline::Pipeline;
pub use reader::PairedReader;
pub use stats::RunStatistics;
pub use trimmer::Trimmer;
pub use writer::PairWriter;
