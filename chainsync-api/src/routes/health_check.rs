use actix_web::{HttpResponse, Responder, get};

#[utoipa::path(
    summary = "Check service health",
    description = "Returns `ok` when the service is up.",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    ),
    tag = "Health"
)]
#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("ok")
}
