//! Print the CassandraDatacenter CRD manifest as YAML.

use anyhow::Result;
use kube::CustomResourceExt;

use cass_operator::CassandraDatacenter;

fn main() -> Result<()> {
    let crd = CassandraDatacenter::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
