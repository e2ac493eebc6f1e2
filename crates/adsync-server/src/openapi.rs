use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "adsync API",
        version = "0.3.0",
        description = "Refreshes ads account entities into warehouse tables."
    ),
    paths(
        crate::routes::get_customers,
        crate::routes::get_campaigns,
        crate::routes::get_adgroups,
        crate::routes::get_adgroupads,
        crate::routes::get_all,
        crate::routes::clear,
        crate::routes::list_tasks,
        crate::routes::get_task,
        crate::routes::cancel_task,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::AccountResponse,
        crate::dto::CustomersResponse,
        crate::dto::StageResponse,
        crate::dto::MessageResponse,
        crate::dto::CreateTaskResponse,
        crate::dto::TaskResponse,
        crate::dto::TaskListResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "stages", description = "Refresh stages"),
        (name = "tasks", description = "Refresh task queue"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "API key. Set via ADSYNC_SERVER_API_KEY environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
