pub mod common;
pub mod datacenter;
pub mod defaults;

pub use datacenter::{
    AuthMode, CassandraDatacenter, CassandraDatacenterSpec, CassandraDatacenterStatus, Rack,
};
