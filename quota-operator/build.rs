use fleetquota_types::*;
use kube::CustomResourceExt;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/quota.fleetquota.io_clusterquota_crd.yaml",
        serde_yaml::to_string(&ClusterQuota::crd()).unwrap(),
    )
    .unwrap();
}
