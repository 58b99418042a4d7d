pub mod dag;
pub mod engine;
pub mod params;
pub mod sampler;
pub mod vertex;

pub use dag::Dag;
pub use engine::Avalanche;
pub use params::Params;
pub use sampler::Sampler;
pub use vertex::{Payload, Vertex, VertexId};
