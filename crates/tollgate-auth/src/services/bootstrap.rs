//! Idempotent seeding of scopes, the admin account, default clients and the
//! initial client key.
//!
//! Every step checks for existing data first, so running bootstrap against a
//! seeded database changes nothing.

use std::sync::Arc;

use jsonwebtoken::jwk::Jwk;
use uuid::Uuid;

use crate::AuthResult;
use crate::clock::SharedClock;
use crate::config::{AccountsConfig, BootstrapConfig, ClientSeed};
use crate::secret;
use crate::services::ClientRegistry;
use crate::storage::{AccountStorage, ClientKeyStorage, RoleStorage};
use crate::types::{
    Client, ClientKey, GrantType, Image, Role, Scope, TokenEndpointAuthMethod, User,
};

/// Key ID under which the initial key is registered.
pub const INITIAL_KEY_ID: &str = "init-key";

/// What a bootstrap run created.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub scopes_created: usize,
    pub admin_created: bool,
    pub clients_created: Vec<String>,
    /// Secrets generated for clients seeded without one, as `(client_id, secret)`.
    /// Shown once; only the hash is stored.
    pub generated_secrets: Vec<(String, String)>,
    pub key_registered: bool,
}

pub struct Bootstrapper {
    accounts: Arc<dyn AccountStorage>,
    roles: Arc<dyn RoleStorage>,
    clients: ClientRegistry,
    keys: Arc<dyn ClientKeyStorage>,
    clock: SharedClock,
}

impl Bootstrapper {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStorage>,
        roles: Arc<dyn RoleStorage>,
        clients: ClientRegistry,
        keys: Arc<dyn ClientKeyStorage>,
        clock: SharedClock,
    ) -> Self {
        Self {
            accounts,
            roles,
            clients,
            keys,
            clock,
        }
    }

    /// Runs every seeding step.
    ///
    /// # Errors
    ///
    /// Returns the first storage or validation error.
    #[tracing::instrument(skip_all)]
    pub async fn run(
        &self,
        config: &BootstrapConfig,
        accounts: &AccountsConfig,
        initial_key: Option<Jwk>,
    ) -> AuthResult<BootstrapReport> {
        let mut report = BootstrapReport::default();

        for seed in &config.scopes {
            let scope = Scope {
                name: seed.name.clone(),
                description: seed.description.clone(),
            };
            if self.roles.upsert_scope(&scope).await? {
                report.scopes_created += 1;
            }
        }

        let admin_role = self
            .roles
            .find_or_create_role(
                &Role::new("admin")
                    .with_description("Administrator with full access")
                    .with_scopes(accounts.scopes_for_role("admin")),
            )
            .await?;
        self.roles
            .link_scopes(admin_role.id, &accounts.scopes_for_role("admin"))
            .await?;

        report.admin_created = self.seed_admin(config, accounts, &admin_role).await?;

        let default_client = default_client(&config.default_client);
        let info_client = info_client(&config.info_client);
        for (client, seed) in [
            (default_client, &config.default_client),
            (info_client, &config.info_client),
        ] {
            self.seed_client(client, seed, &mut report).await?;
        }

        if let Some(jwk) = initial_key {
            report.key_registered = self.seed_key(config, jwk).await?;
        }

        tracing::info!(
            scopes = report.scopes_created,
            admin = report.admin_created,
            clients = report.clients_created.len(),
            key = report.key_registered,
            "Bootstrap complete"
        );
        Ok(report)
    }

    async fn seed_admin(
        &self,
        config: &BootstrapConfig,
        accounts: &AccountsConfig,
        role: &Role,
    ) -> AuthResult<bool> {
        let Some(password) = config.admin_password.as_deref() else {
            tracing::warn!("bootstrap.admin_password not set, skipping admin account");
            return Ok(false);
        };
        if self
            .accounts
            .find_user_by_username(&config.admin_username)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: config.admin_username.clone(),
            email: config.admin_email.clone(),
            password_hash: secret::hash_secret(password)?,
            role_id: role.id,
            role_name: role.name.clone(),
            created_at: self.clock.now(),
        };
        let image = Image {
            id: Uuid::new_v4(),
            user_id: user.id,
            file_name: accounts.default_image.clone(),
            url: accounts.default_image_url(),
        };
        self.accounts.create_user(&user, &image).await?;
        Ok(true)
    }

    async fn seed_client(
        &self,
        mut client: Client,
        seed: &ClientSeed,
        report: &mut BootstrapReport,
    ) -> AuthResult<()> {
        match self.clients.storage().find_client(&client.client_id).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if !client.public {
            let plain = match &seed.secret {
                Some(secret) => secret.clone(),
                None => {
                    let generated = secret::generate_client_secret();
                    report
                        .generated_secrets
                        .push((client.client_id.clone(), generated.clone()));
                    generated
                }
            };
            client.secret = Some(plain);
            if let Some(rotated) = &seed.rotated_secret {
                client.rotated_secrets.push(rotated.clone());
            }
        }

        let client = self.clients.register(client).await?;
        report.clients_created.push(client.client_id);
        Ok(())
    }

    async fn seed_key(&self, config: &BootstrapConfig, jwk: Jwk) -> AuthResult<bool> {
        let client_id = &config.default_client.client_id;
        let key = ClientKey::new(
            client_id.clone(),
            config.issuer.clone(),
            client_id.clone(),
            INITIAL_KEY_ID,
            jwk.clone(),
        )
        .with_scopes(config.default_client.scopes.clone());

        match self.keys.add_key(&key).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => return Ok(false),
            Err(e) => return Err(e),
        }

        let mut client = self.clients.storage().find_client(client_id).await?;
        if client.jwks.is_empty() {
            client.jwks.push(jwk);
            self.clients.update(client).await?;
        }
        Ok(true)
    }
}

fn default_client(seed: &ClientSeed) -> Client {
    let mut client = Client::new(seed.client_id.clone());
    client.name = seed.name.clone();
    client.public = seed.public;
    client.redirect_uris = seed.redirect_uris.clone();
    client.scopes = seed.scopes.clone();
    client.grant_types = vec![
        GrantType::AuthorizationCode,
        GrantType::RefreshToken,
        GrantType::ClientCredentials,
    ];
    client.response_types = vec!["code".into(), "id_token".into(), "token".into()];
    client.response_modes = vec!["query".into(), "fragment".into(), "form_post".into()];
    client.token_endpoint_auth_method = if seed.public {
        TokenEndpointAuthMethod::None
    } else {
        TokenEndpointAuthMethod::ClientSecretBasic
    };
    if seed.public {
        client.grant_types.retain(|g| *g != GrantType::ClientCredentials);
    }
    client
}

fn info_client(seed: &ClientSeed) -> Client {
    let mut client = Client::new(seed.client_id.clone());
    client.name = seed.name.clone();
    client.public = false;
    client.redirect_uris = seed.redirect_uris.clone();
    client.scopes = seed.scopes.clone();
    client.grant_types = vec![GrantType::ClientCredentials];
    client.token_endpoint_auth_method = TokenEndpointAuthMethod::ClientSecretBasic;
    client
}
