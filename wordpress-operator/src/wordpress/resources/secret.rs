use crate::crd::Wordpress;
use crate::syncer::ObjectSyncer;
use crate::wordpress::{child_meta, labels, merge_labels, secret_name};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::BTreeMap;

/// WordPress authentication keys and salts stored in the site secret.
pub const SALT_KEYS: [&str; 8] = [
    "AUTH_KEY",
    "SECURE_AUTH_KEY",
    "LOGGED_IN_KEY",
    "NONCE_KEY",
    "AUTH_SALT",
    "SECURE_AUTH_SALT",
    "LOGGED_IN_SALT",
    "NONCE_SALT",
];

const SALT_LENGTH: usize = 64;

fn random_salt() -> ByteString {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect();
    ByteString(salt.into_bytes())
}

/// Syncer for the `{site}-wp` secret.
///
/// Salts are generated once; existing values are never rotated.
pub fn secret_syncer(wp: &Wordpress, owner: OwnerReference) -> ObjectSyncer<Secret> {
    let obj = Secret {
        metadata: child_meta(wp, secret_name(wp)),
        ..Default::default()
    };
    let labels = labels(wp, "web");

    ObjectSyncer::new("secret", owner, obj, move |secret: &mut Secret| {
        merge_labels(&mut secret.metadata, labels.clone());

        let data = secret.data.get_or_insert_with(BTreeMap::new);
        for key in SALT_KEYS {
            data.entry(key.to_string()).or_insert_with(random_salt);
        }

        Ok(())
    })
}
