use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers::resource;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/resources", resource_routes(config))
}

fn resource_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(resource::local_upload))
        .layer(resource::local_upload_body_limit(
            config.storage.max_upload_size,
        ));

    OpenApiRouter::new()
        .routes(routes!(resource::list_resources))
        .routes(routes!(resource::request_upload_token))
        .routes(routes!(resource::finalize_upload))
        .routes(routes!(resource::get_usage))
        .routes(routes!(resource::reconcile_references))
        .routes(routes!(resource::render_content))
        .routes(routes!(resource::get_resource, resource::delete_resource))
        .merge(upload)
}
