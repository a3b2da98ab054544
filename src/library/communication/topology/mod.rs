//! Descriptions of broker-side entities and their provisioning
//!
//! Requests travel through an exchange into a queue. Before a request can be sent, its reply
//! queue and exchange have to exist and be bound together, which is what the [`TopologyProvisioner`]
//! takes care of. Declarations are idempotent so the same topology may be provisioned over and over.

mod descriptor;
mod provisioner;
mod routing;

pub use descriptor::*;
pub use provisioner::*;
pub use routing::*;
