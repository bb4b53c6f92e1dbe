pub use scc_controller_core as core;
pub use scc_controller_k8s_api as k8s;
pub use scc_controller_k8s_index as index;

mod admission;
mod args;
mod metrics;

pub use self::args::Args;
