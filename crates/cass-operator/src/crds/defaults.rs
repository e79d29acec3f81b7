//! Default functions for serde defaults in CRD specs.

pub fn image() -> String {
    crate::constants::defaults::IMAGE.to_string()
}

pub fn storage_size() -> String {
    crate::constants::defaults::STORAGE_SIZE.to_string()
}

pub fn access_modes() -> Vec<String> {
    vec!["ReadWriteOnce".to_string()]
}
