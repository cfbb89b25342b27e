mod container;
pub use container::ContainerSpec;

mod port;
pub use port::{PortSpec, Protocol};

mod replicas;
pub use replicas::Replicas;

mod route;
pub use route::RouteSpec;
