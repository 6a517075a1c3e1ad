//! Credential Provisioner
//!
//! Idempotently produces keystore and truststore secrets bound to the
//! hostnames resolved during the route phase. A valid existing secret is
//! reused; a stale one is superseded through normal create/update
//! semantics, with its prior content preserved under a derived backup
//! name. Generated secrets land in the environment description so the
//! flattener picks them up with everything else.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::Resource;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use x509_parser::pem::parse_x509_pem;

use crate::config::CoreConfig;
use crate::crd::{AppSuite, AppSuiteStatus};
use crate::error::{Error, Result};
use crate::platform::Route;
use crate::reconcile::routes::deployed_host;
use crate::resolver::{ComponentObjects, Environment};
use crate::resources::{ManagedResource, ResourceId, ResourceKind};
use crate::store::Store;

pub const KEYSTORE_CERT_KEY: &str = "tls.crt";
pub const KEYSTORE_KEY_KEY: &str = "tls.key";
pub const KEYSTORE_SEAL_KEY: &str = "keystore.seal";
pub const TRUSTSTORE_BUNDLE_KEY: &str = "ca.crt";
pub const TRUSTSTORE_SEAL_KEY: &str = "truststore.seal";

/// Key under which the platform injects the CA bundle into the config map
pub const CA_BUNDLE_KEY: &str = "ca-bundle.crt";

/// Environment profile whose console host comes from the dashboard routes
pub const STANDALONE_DASHBOARD_ENV: &str = "standalone-dashboard";

/// Provision keystore/truststore secrets for every protected endpoint and
/// record the console host on the CR status.
pub async fn provision(
    store: &dyn Store,
    config: &CoreConfig,
    app: &mut AppSuite,
    env: &mut Environment,
    deployed_routes: &[ManagedResource],
    ca_bundle: Option<&ConfigMap>,
) -> Result<()> {
    let applied = app.applied().clone();
    let app_name = app.application_name();
    let password = if applied.common.keystore_password.is_empty() {
        config.keystore_password.clone()
    } else {
        applied.common.keystore_password.clone()
    };

    if applied.common.platform_ca {
        if let Some(bundle) = ca_bundle_bytes(ca_bundle) {
            let secret = generate_truststore_secret(
                store,
                app,
                &format!("{app_name}-truststore"),
                &bundle,
            )
            .await?;
            if env.others.is_empty() {
                env.others.push(ComponentObjects::default());
            }
            env.others[0].secrets.push(secret);
        }
    }

    // console keystore
    if !env.console.omit && !env.console.is_empty() {
        let console_cn = set_console_host(app, env, deployed_routes);
        let user_keystore = applied
            .objects
            .console
            .as_ref()
            .map(|c| c.keystore_secret.clone())
            .unwrap_or_default();
        if user_keystore.is_empty() && !applied.common.disable_ssl {
            let secret = generate_keystore_secret(
                store,
                app,
                &format!("{app_name}-console-keystore"),
                &console_cn,
                &password,
            )
            .await?;
            env.console.secrets.push(secret);
        }
    }

    // dashboard keystore
    if applied.objects.dashboard.is_some()
        && !env.dashboard.is_empty()
        && !applied.common.disable_ssl
    {
        let console_cn = set_console_host(app, env, deployed_routes);
        let user_keystore = applied
            .objects
            .dashboard
            .as_ref()
            .map(|d| d.keystore_secret.clone())
            .unwrap_or_default();
        if user_keystore.is_empty() {
            let secret = generate_keystore_secret(
                store,
                app,
                &format!("{app_name}-dashboard-keystore"),
                &console_cn,
                &password,
            )
            .await?;
            env.dashboard.secrets.push(secret);
        }
    }

    // server keystores
    for index in 0..env.servers.len() {
        if env.servers[index].omit || env.servers[index].is_empty() {
            continue;
        }
        let cn = endpoint_cn(&env.servers[index].routes, deployed_routes, &app_name);
        let user_keystore = applied
            .objects
            .servers
            .get(index)
            .map(|s| s.keystore_secret.clone())
            .unwrap_or_default();
        if user_keystore.is_empty() && !applied.common.disable_ssl {
            let deployment_name = app.server_deployment_name(index);
            let secret = generate_keystore_secret(
                store,
                app,
                &format!("{deployment_name}-keystore"),
                &cn,
                &password,
            )
            .await?;
            env.servers[index].secrets.push(secret);
        }
    }

    // router keystore
    if !env.router.omit && !env.router.is_empty() {
        let cn = endpoint_cn(&env.router.routes, deployed_routes, &app_name);
        let user_keystore = applied
            .objects
            .router
            .as_ref()
            .map(|r| r.keystore_secret.clone())
            .unwrap_or_default();
        if user_keystore.is_empty() && !applied.common.disable_ssl {
            let secret = generate_keystore_secret(
                store,
                app,
                &format!("{app_name}-router-keystore"),
                &cn,
                &password,
            )
            .await?;
            env.router.secrets.push(secret);
        }
    }

    Ok(())
}

fn ca_bundle_bytes(ca_bundle: Option<&ConfigMap>) -> Option<Vec<u8>> {
    ca_bundle
        .and_then(|cm| cm.data.as_ref())
        .and_then(|data| data.get(CA_BUNDLE_KEY))
        .filter(|bundle| !bundle.is_empty())
        .map(|bundle| bundle.clone().into_bytes())
}

/// CN of the first TLS-enabled route, falling back to the application
/// name for plain deployments
fn endpoint_cn(routes: &[Route], deployed: &[ManagedResource], fallback: &str) -> String {
    routes
        .iter()
        .filter(|route| route.spec.tls.is_some())
        .map(|route| deployed_host(route, deployed))
        .find(|host| !host.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Derive the console CN and record the externally reachable address on
/// the CR status
fn set_console_host(app: &mut AppSuite, env: &Environment, deployed: &[ManagedResource]) -> String {
    let routes = if app.applied().environment == STANDALONE_DASHBOARD_ENV {
        &env.dashboard.routes
    } else {
        &env.console.routes
    };
    let cn = routes
        .iter()
        .filter(|route| route.spec.tls.is_some())
        .map(|route| deployed_host(route, deployed))
        .find(|host| !host.is_empty());
    let (cn, console_host) = match cn {
        Some(host) => {
            let address = format!("https://{host}");
            (host, address)
        }
        None => {
            let fallback = app.application_name();
            let address = format!("http://{fallback}");
            (fallback, address)
        }
    };
    debug!(console_host = %console_host, "set console host");
    app.status.get_or_insert_with(AppSuiteStatus::default).console_host = console_host;
    cn
}

/// Reuse the existing keystore secret iff it opens under the configured
/// password and its certificate CN matches; otherwise generate a fresh
/// self-signed keystore and preserve the prior content under a backup name.
async fn generate_keystore_secret(
    store: &dyn Store,
    app: &AppSuite,
    secret_name: &str,
    cn: &str,
    password: &str,
) -> Result<Secret> {
    let namespace = app.metadata.namespace.clone().unwrap_or_default();
    let id = ResourceId::new(ResourceKind::Secret, namespace, secret_name);
    let existing = match store.get(&id).await? {
        Some(ManagedResource::Secret(secret)) => Some(secret),
        _ => None,
    };

    if let Some(secret) = existing.as_ref() {
        if is_valid_keystore(secret, cn, password) {
            return Ok(secret.clone());
        }
    }

    info!(kind = %ResourceKind::Secret, name = secret_name, cn, "generating keystore");
    let (cert_pem, key_pem) = self_signed_pair(cn)?;
    let mut data = BTreeMap::new();
    data.insert(
        KEYSTORE_CERT_KEY.to_string(),
        ByteString(cert_pem.clone().into_bytes()),
    );
    data.insert(KEYSTORE_KEY_KEY.to_string(), ByteString(key_pem.into_bytes()));
    data.insert(
        KEYSTORE_SEAL_KEY.to_string(),
        ByteString(seal(password.as_bytes(), cert_pem.as_bytes()).into_bytes()),
    );
    let secret = credential_secret(app, secret_name, data);

    if let Some(stale) = existing {
        preserve_backup(store, &stale).await?;
    }
    Ok(secret)
}

/// Reuse the existing truststore iff it still validates against the
/// current CA bundle bytes
async fn generate_truststore_secret(
    store: &dyn Store,
    app: &AppSuite,
    secret_name: &str,
    bundle: &[u8],
) -> Result<Secret> {
    let namespace = app.metadata.namespace.clone().unwrap_or_default();
    let id = ResourceId::new(ResourceKind::Secret, namespace, secret_name);
    let existing = match store.get(&id).await? {
        Some(ManagedResource::Secret(secret)) => Some(secret),
        _ => None,
    };

    if let Some(secret) = existing.as_ref() {
        if is_valid_truststore(secret, bundle) {
            return Ok(secret.clone());
        }
    }

    info!(kind = %ResourceKind::Secret, name = secret_name, "generating truststore");
    let mut data = BTreeMap::new();
    data.insert(
        TRUSTSTORE_BUNDLE_KEY.to_string(),
        ByteString(bundle.to_vec()),
    );
    data.insert(
        TRUSTSTORE_SEAL_KEY.to_string(),
        ByteString(hex::encode(Sha256::digest(bundle)).into_bytes()),
    );
    let secret = credential_secret(app, secret_name, data);

    if let Some(stale) = existing {
        preserve_backup(store, &stale).await?;
    }
    Ok(secret)
}

/// A keystore is valid iff regenerating it from the current inputs would
/// agree on the security-relevant fields: the seal binds the configured
/// password to the certificate bytes, and the certificate CN matches.
pub fn is_valid_keystore(secret: &Secret, cn: &str, password: &str) -> bool {
    let Some(data) = secret.data.as_ref() else {
        return false;
    };
    let (Some(cert), Some(stored_seal)) =
        (data.get(KEYSTORE_CERT_KEY), data.get(KEYSTORE_SEAL_KEY))
    else {
        return false;
    };
    if seal(password.as_bytes(), &cert.0).into_bytes() != stored_seal.0 {
        return false;
    }
    certificate_cn(&cert.0).as_deref() == Some(cn)
}

pub fn is_valid_truststore(secret: &Secret, bundle: &[u8]) -> bool {
    let Some(data) = secret.data.as_ref() else {
        return false;
    };
    let (Some(stored), Some(stored_seal)) = (
        data.get(TRUSTSTORE_BUNDLE_KEY),
        data.get(TRUSTSTORE_SEAL_KEY),
    ) else {
        return false;
    };
    stored.0 == bundle && hex::encode(Sha256::digest(bundle)).into_bytes() == stored_seal.0
}

/// CN of the first certificate in a PEM blob
pub fn certificate_cn(pem: &[u8]) -> Option<String> {
    let (_, parsed) = parse_x509_pem(pem).ok()?;
    let cert = parsed.parse_x509().ok()?;
    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string);
    cn
}

fn seal(password: &[u8], cert: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(cert);
    hex::encode(hasher.finalize())
}

fn self_signed_pair(cn: &str) -> Result<(String, String)> {
    let key_pair = KeyPair::generate().map_err(|e| Error::Credential(e.to_string()))?;
    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, cn);
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Credential(e.to_string()))?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}

fn credential_secret(
    app: &AppSuite,
    name: &str,
    data: BTreeMap<String, ByteString>,
) -> Secret {
    let app_name = app.application_name();
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.labels = Some(BTreeMap::from([
        ("app".to_string(), app_name.clone()),
        ("application".to_string(), app_name),
    ]));
    secret.type_ = Some("Opaque".to_string());
    secret.data = Some(data);
    secret
}

/// Preserve a superseded secret under a derived backup name. The stale
/// copy is never force-deleted; if the backup name already exists, the
/// existing object wins.
async fn preserve_backup(store: &dyn Store, stale: &Secret) -> Result<()> {
    let mut backup = stale.clone();
    backup.metadata.name = Some(backup_name(stale));
    backup.metadata.resource_version = None;
    backup.metadata.uid = None;
    backup.metadata.owner_references = None;
    match store.create(ManagedResource::Secret(backup)).await {
        Ok(()) => Ok(()),
        Err(Error::AlreadyExists(id)) => {
            debug!(name = %id.name, "backup already exists, keeping it");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// `{name}-bak`, or `{name}-{ver}-bak` when the object carries a version
/// annotation keyed by the CR API group
pub fn backup_name(secret: &Secret) -> String {
    let name = secret.metadata.name.clone().unwrap_or_default();
    let group = AppSuite::group(&());
    if let Some(annotations) = secret.metadata.annotations.as_ref() {
        if let Some(version) = annotations.get(group.as_ref()) {
            return format!("{name}-{version}-bak");
        }
    }
    format!("{name}-bak")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TlsConfig;
    use crate::store::MemoryStore;
    use kube::api::ObjectMeta;

    fn app() -> AppSuite {
        AppSuite {
            metadata: ObjectMeta {
                name: Some("myapp".to_string()),
                namespace: Some("demo".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    fn tls_route(name: &str) -> Route {
        let mut route = Route::default();
        route.metadata.name = Some(name.to_string());
        route.spec.tls = Some(TlsConfig {
            termination: "edge".to_string(),
        });
        route
    }

    fn deployed_route(name: &str, host: &str) -> ManagedResource {
        let mut route = tls_route(name);
        route.metadata.namespace = Some("demo".to_string());
        route.spec.host = host.to_string();
        ManagedResource::Route(route)
    }

    #[tokio::test]
    async fn keystore_cn_comes_from_first_tls_route() {
        let store = MemoryStore::new();
        let mut app = app();
        let mut env = Environment::default();
        env.console.routes.push(tls_route("console"));
        let deployed = vec![deployed_route("console", "app.example.com")];

        provision(
            &store,
            &CoreConfig::default(),
            &mut app,
            &mut env,
            &deployed,
            None,
        )
        .await
        .unwrap();

        assert_eq!(env.console.secrets.len(), 1);
        let secret = &env.console.secrets[0];
        assert_eq!(
            secret.metadata.name.as_deref(),
            Some("myapp-console-keystore")
        );
        let cert = &secret.data.as_ref().unwrap()[KEYSTORE_CERT_KEY];
        assert_eq!(certificate_cn(&cert.0).as_deref(), Some("app.example.com"));
        assert_eq!(
            app.status.as_ref().unwrap().console_host,
            "https://app.example.com"
        );
    }

    #[tokio::test]
    async fn componentless_endpoints_get_no_keystore() {
        let store = MemoryStore::new();
        let mut app = app();
        let mut env = Environment::default();
        env.console.routes.push(tls_route("console"));
        let deployed = vec![deployed_route("console", "app.example.com")];

        provision(
            &store,
            &CoreConfig::default(),
            &mut app,
            &mut env,
            &deployed,
            None,
        )
        .await
        .unwrap();

        assert_eq!(env.console.secrets.len(), 1);
        assert!(
            env.router.secrets.is_empty(),
            "a component the resolver produced nothing for is no endpoint"
        );
        assert!(env.dashboard.secrets.is_empty());
    }

    #[tokio::test]
    async fn plain_deployment_falls_back_to_application_name() {
        let store = MemoryStore::new();
        let mut app = app();
        let mut env = Environment::default();
        env.console.routes.push(tls_route("console"));

        provision(
            &store,
            &CoreConfig::default(),
            &mut app,
            &mut env,
            &[],
            None,
        )
        .await
        .unwrap();

        let cert = &env.console.secrets[0].data.as_ref().unwrap()[KEYSTORE_CERT_KEY];
        assert_eq!(certificate_cn(&cert.0).as_deref(), Some("myapp"));
        assert_eq!(app.status.as_ref().unwrap().console_host, "http://myapp");
    }

    #[tokio::test]
    async fn valid_keystore_is_reused_verbatim() {
        let store = MemoryStore::new();
        let mut app = app();
        let mut env = Environment::default();
        env.console.routes.push(tls_route("console"));
        let deployed = vec![deployed_route("console", "app.example.com")];
        let config = CoreConfig::default();

        provision(&store, &config, &mut app, &mut env, &deployed, None)
            .await
            .unwrap();
        let first = env.console.secrets[0].clone();
        let mut stored = ManagedResource::Secret(first.clone());
        stored.set_namespace("demo");
        store.seed(stored).await;

        let mut env = Environment::default();
        env.console.routes.push(tls_route("console"));
        provision(&store, &config, &mut app, &mut env, &deployed, None)
            .await
            .unwrap();
        assert_eq!(
            env.console.secrets[0].data, first.data,
            "unchanged CN must reuse the existing keystore"
        );
    }

    #[tokio::test]
    async fn cn_change_regenerates_and_preserves_backup() {
        let store = MemoryStore::new();
        let mut app = app();
        let config = CoreConfig::default();
        let mut env = Environment::default();
        env.console.routes.push(tls_route("console"));
        let deployed = vec![deployed_route("console", "app.example.com")];

        provision(&store, &config, &mut app, &mut env, &deployed, None)
            .await
            .unwrap();
        let first = env.console.secrets[0].clone();
        let mut stored = ManagedResource::Secret(first.clone());
        stored.set_namespace("demo");
        store.seed(stored).await;

        let moved = vec![deployed_route("console", "other.example.com")];
        let mut env = Environment::default();
        env.console.routes.push(tls_route("console"));
        provision(&store, &config, &mut app, &mut env, &moved, None)
            .await
            .unwrap();

        let cert = &env.console.secrets[0].data.as_ref().unwrap()[KEYSTORE_CERT_KEY];
        assert_eq!(
            certificate_cn(&cert.0).as_deref(),
            Some("other.example.com")
        );
        let backup_id = ResourceId::new(
            ResourceKind::Secret,
            "demo",
            "myapp-console-keystore-bak",
        );
        assert!(store.contains(&backup_id).await, "stale copy must survive");
    }

    #[tokio::test]
    async fn truststore_follows_the_ca_bundle_fingerprint() {
        let store = MemoryStore::new();
        let mut app = app();
        app.spec.common.platform_ca = true;
        let config = CoreConfig::default();

        let mut ca = ConfigMap::default();
        ca.data = Some(BTreeMap::from([(
            CA_BUNDLE_KEY.to_string(),
            "CA ONE".to_string(),
        )]));

        let mut env = Environment::default();
        provision(&store, &config, &mut app, &mut env, &[], Some(&ca))
            .await
            .unwrap();
        let first = env.others[0].secrets[0].clone();
        assert!(is_valid_truststore(&first, b"CA ONE"));
        assert!(!is_valid_truststore(&first, b"CA TWO"));
    }

    #[test]
    fn backup_name_uses_group_version_annotation() {
        let mut secret = Secret::default();
        secret.metadata.name = Some("myapp-console-keystore".to_string());
        assert_eq!(backup_name(&secret), "myapp-console-keystore-bak");

        secret.metadata.annotations = Some(BTreeMap::from([(
            AppSuite::group(&()).to_string(),
            "2".to_string(),
        )]));
        assert_eq!(backup_name(&secret), "myapp-console-keystore-2-bak");
    }
}
