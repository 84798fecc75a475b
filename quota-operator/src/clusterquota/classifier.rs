/// The category a resource identifier falls into, and enough information
/// to dispatch usage computation without re-parsing the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    ObjectCount,
    ComputeAggregate,
    StorageAggregate,
    StorageClassScopedSize(String),
    StorageClassScopedCount(String),
    ExtendedDevice,
    Unknown,
}

const OBJECT_COUNT_KINDS: &[&str] =
    &["pods", "services", "configmaps", "secrets", "persistentvolumeclaims", "replicationcontrollers"];

const COMPUTE_AGGREGATE: &[&str] =
    &["requests.cpu", "requests.memory", "limits.cpu", "limits.memory", "requests.ephemeral-storage"];

const STORAGE_CLASS_SIZE_SUFFIX: &str = ".storageclass.storage.k8s.io/requests.storage";
const STORAGE_CLASS_COUNT_SUFFIX: &str = ".storageclass.storage.k8s.io/persistentvolumeclaims";

/// Classifies a resource identifier as it appears in `spec.hard`. Pure
/// and total: every string maps to exactly one category.
///
/// Precedence rule: storage-class-scoped suffixes are checked before the
/// generic "contains a dot" extended-device rule, so a key like
/// `fast.storageclass.storage.k8s.io/requests.storage` is never
/// misclassified as an extended device even though it contains dots.
pub fn classify(resource: &str) -> Category {
    if OBJECT_COUNT_KINDS.contains(&resource) {
        return Category::ObjectCount;
    }
    if COMPUTE_AGGREGATE.contains(&resource) {
        return Category::ComputeAggregate;
    }
    if resource == "requests.storage" {
        return Category::StorageAggregate;
    }
    if let Some(class) = resource.strip_suffix(STORAGE_CLASS_SIZE_SUFFIX) {
        return Category::StorageClassScopedSize(class.to_owned());
    }
    if let Some(class) = resource.strip_suffix(STORAGE_CLASS_COUNT_SUFFIX) {
        return Category::StorageClassScopedCount(class.to_owned());
    }
    if resource.starts_with("hugepages-") || resource.to_lowercase().contains("gpu") {
        return Category::ExtendedDevice;
    }
    // `vendor.domain/name` (extended device) vs `plural.group` (an
    // enumerated extension kind, counted as object-count). The former
    // always carries a slash; the latter never does.
    if resource.contains('/') && resource.contains('.') {
        return Category::ExtendedDevice;
    }
    if resource.contains('.') && !resource.contains('/') {
        return Category::ObjectCount;
    }
    Category::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_object_counts() {
        assert_eq!(classify("pods"), Category::ObjectCount);
        assert_eq!(classify("persistentvolumeclaims"), Category::ObjectCount);
    }

    #[test]
    fn classifies_compute_aggregates() {
        assert_eq!(classify("requests.cpu"), Category::ComputeAggregate);
        assert_eq!(classify("limits.memory"), Category::ComputeAggregate);
    }

    #[test]
    fn classifies_storage_aggregate() {
        assert_eq!(classify("requests.storage"), Category::StorageAggregate);
    }

    #[test]
    fn storage_class_suffix_wins_over_extended_device() {
        assert_eq!(
            classify("fast.storageclass.storage.k8s.io/requests.storage"),
            Category::StorageClassScopedSize("fast".to_owned())
        );
        assert_eq!(
            classify("fast.storageclass.storage.k8s.io/persistentvolumeclaims"),
            Category::StorageClassScopedCount("fast".to_owned())
        );
    }

    #[test]
    fn classifies_extended_devices() {
        assert_eq!(classify("hugepages-2Mi"), Category::ExtendedDevice);
        assert_eq!(classify("nvidia.com/gpu"), Category::ExtendedDevice);
    }

    #[test]
    fn classifies_extension_kind_counts() {
        assert_eq!(classify("widgets.example.com"), Category::ObjectCount);
    }

    #[test]
    fn unknown_identifiers_fall_through() {
        assert_eq!(classify("not-a-real-resource"), Category::Unknown);
    }
}
