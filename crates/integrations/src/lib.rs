//! Adapters for the services requests depend on outside this process: the
//! Keycloak authorization server and the outgoing mail relay.

pub mod keycloak;
pub mod mail;

pub use keycloak::{KeycloakConfig, KeycloakRegistrar, LocalRegistrar};
pub use mail::{LogMailer, MailRelay};
