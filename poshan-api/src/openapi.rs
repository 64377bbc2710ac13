//! OpenAPI document for the Poshan gateway, generated with utoipa from the
//! route annotations.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ErrorBody, ErrorEnvelope};
use crate::routes::{auth, health, poshan, products};
use poshan_core::{Identity, Origin, ProductImage, ProductRecord, Resolution, SearchResults};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Poshan Gateway",
        description = "Token-gated, throttled product lookup with a local cache in front of Open Food Facts",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Products", description = "Barcode lookup and product search"),
        (name = "Auth", description = "Caller identity"),
        (name = "Poshan", description = "Nutrition summary"),
        (name = "Health", description = "Liveness and readiness probes")
    ),
    paths(
        products::get_by_barcode,
        products::search,
        auth::me,
        poshan::summary,
        health::ping,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        ErrorEnvelope,
        ErrorBody,
        Identity,
        Origin,
        ProductImage,
        ProductRecord,
        Resolution,
        SearchResults,
        poshan::PoshanSummary,
        health::HealthResponse,
        health::HealthStatus,
        health::HealthDetails,
        health::ComponentHealth,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the `bearer_auth` scheme referenced by protected routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("HS256 token carrying subjectId and email"))
                        .build(),
                ),
            );
        }
    }
}
