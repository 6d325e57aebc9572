use actix_web::HttpResponse;
use soprano_core::persona::GREETING;

pub async fn handler() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "message": GREETING }))
}
