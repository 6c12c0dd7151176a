//! Cloud Storage JSON API resources

use std::fmt;

/// Resource collections of the Cloud Storage JSON API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageResource {
    BucketAccessControls,
    Buckets,
    Channels,
    DefaultObjectAccessControls,
    Notifications,
    ObjectAccessControls,
    Objects,
    ProjectsHmacKeys,
    ProjectsServiceAccounts,
}

impl StorageResource {
    pub const ALL: [StorageResource; 9] = [
        Self::BucketAccessControls,
        Self::Buckets,
        Self::Channels,
        Self::DefaultObjectAccessControls,
        Self::Notifications,
        Self::ObjectAccessControls,
        Self::Objects,
        Self::ProjectsHmacKeys,
        Self::ProjectsServiceAccounts,
    ];

    /// Resource name as used in the discovery document
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BucketAccessControls => "bucketAccessControls",
            Self::Buckets => "buckets",
            Self::Channels => "channels",
            Self::DefaultObjectAccessControls => "defaultObjectAccessControls",
            Self::Notifications => "notifications",
            Self::ObjectAccessControls => "objectAccessControls",
            Self::Objects => "objects",
            Self::ProjectsHmacKeys => "projects.hmacKeys",
            Self::ProjectsServiceAccounts => "projects.serviceAccount",
        }
    }

    /// Methods the real API offers on this resource
    pub fn operations(&self) -> &'static [&'static str] {
        match self {
            Self::BucketAccessControls
            | Self::Notifications
            | Self::ObjectAccessControls => &["delete", "get", "insert", "list", "patch", "update"],
            Self::Buckets => &[
                "delete",
                "get",
                "getIamPolicy",
                "insert",
                "list",
                "listChannels",
                "lockRetentionPolicy",
                "patch",
                "setIamPolicy",
                "testIamPermissions",
                "update",
            ],
            Self::Channels => &["stop"],
            Self::DefaultObjectAccessControls => &["delete", "get", "insert", "list"],
            Self::Objects => &[
                "compose", "copy", "delete", "get", "insert", "list", "patch", "rewrite", "update",
                "watchAll",
            ],
            Self::ProjectsHmacKeys => &["create", "delete", "get", "list", "update"],
            Self::ProjectsServiceAccounts => &["get"],
        }
    }

    /// Work out which resource a JSON API request path addresses
    pub fn classify(path: &str) -> Option<Self> {
        let path = path.split('?').next().unwrap_or(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let rest = match segments.as_slice() {
            ["storage", "v1", rest @ ..]
            | ["upload", "storage", "v1", rest @ ..]
            | ["download", "storage", "v1", rest @ ..] => rest,
            _ => return None,
        };

        let resource = match rest {
            ["b"] | ["b", _] | ["b", _, "iam", ..] | ["b", _, "lockRetentionPolicy"] => Self::Buckets,
            ["b", _, "acl", ..] => Self::BucketAccessControls,
            ["b", _, "defaultObjectAcl", ..] => Self::DefaultObjectAccessControls,
            ["b", _, "notificationConfigs", ..] => Self::Notifications,
            ["b", _, "o", _, "acl", ..] => Self::ObjectAccessControls,
            ["b", _, "o", ..] => Self::Objects,
            ["channels", ..] => Self::Channels,
            ["projects", _, "hmacKeys", ..] => Self::ProjectsHmacKeys,
            ["projects", _, "serviceAccount"] => Self::ProjectsServiceAccounts,
            _ => return None,
        };
        Some(resource)
    }
}

impl fmt::Display for StorageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
