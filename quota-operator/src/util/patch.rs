use super::MANAGER_NAME;
use fleetquota_types::*;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, jiff::Timestamp};
use kube::{
    Api, Client, Error,
    api::{Patch, PatchParams, Resource},
    core::ClusterResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

pub trait Object<S: Status> {
    /// Returns a mutable reference to the status object, initializing it
    /// with the default value if it does not exist.
    fn mut_status(&mut self) -> &mut S;
}

pub trait Status {
    fn set_last_updated(&mut self, last_updated: Time);
}

impl Object<ClusterQuotaStatus> for ClusterQuota {
    fn mut_status(&mut self) -> &mut ClusterQuotaStatus {
        if self.status.is_some() {
            return self.status.as_mut().unwrap();
        }
        self.status = Some(Default::default());
        self.status.as_mut().unwrap()
    }
}

impl Status for ClusterQuotaStatus {
    fn set_last_updated(&mut self, last_updated: Time) {
        self.last_updated = Some(last_updated);
    }
}

/// Patches the resource's status object via a JSON merge-patch diffed
/// against the freshly-fetched object, using server-side apply so that
/// concurrent writers surface as a `409 Conflict` rather than silently
/// clobbering each other.
///
/// `instance` must be the object just fetched from the API — the diff is
/// computed against it, which is what gives the caller optimistic
/// concurrency for free.
pub async fn patch_status<S: Status, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = ClusterResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        let status = modified.mut_status();
        f(status);
        status.set_last_updated(Time::from(Timestamp::now()));
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let api: Api<T> = Api::all(client);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}
