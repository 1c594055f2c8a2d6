use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::routes::{auth, chat, config, files, health, providers};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "nora-server",
        description = "Nora AI assistant gateway API",
        version = "0.1.0",
        contact(name = "nora", url = "https://github.com/nora-ai/nora-gateway")
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
        );
    }
}

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(auth::AuthApi::openapi());
    root.merge(config::ConfigApi::openapi());
    root.merge(chat::ChatApi::openapi());
    root.merge(files::FilesApi::openapi());
    root.merge(providers::ProvidersApi::openapi());
    root
}
