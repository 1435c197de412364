pub mod v1alpha1;

use kube::CustomResourceExt;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("yaml error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

pub fn crd_gen_srv6vrf() -> Result<()> {
    print!(
        "---\n{}",
        serde_yaml::to_string(&v1alpha1::srv6vrf::SRv6VRF::crd())?
    );
    Ok(())
}

pub fn crd_gen_srv6egresspolicy() -> Result<()> {
    print!(
        "---\n{}",
        serde_yaml::to_string(&v1alpha1::srv6egresspolicy::SRv6EgressPolicy::crd())?
    );
    Ok(())
}

pub fn crd_gen_all() -> Result<()> {
    let crds = vec![
        v1alpha1::srv6vrf::SRv6VRF::crd(),
        v1alpha1::srv6egresspolicy::SRv6EgressPolicy::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
