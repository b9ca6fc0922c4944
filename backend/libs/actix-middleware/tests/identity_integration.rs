use actix_middleware::{get_request_id, Logging, RequestId, TrustedIdentity, UserId};
use actix_web::{body, test, web, App, HttpMessage, HttpRequest, HttpResponse};
use error_types::{error_codes, error_kinds, ErrorResponse};

async fn whoami(req: HttpRequest) -> HttpResponse {
    match req.extensions().get::<UserId>() {
        Some(user) => HttpResponse::Ok().body(user.0.to_string()),
        None => HttpResponse::Ok().body("anonymous"),
    }
}

async fn echo_request_id(req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().body(get_request_id(&req).unwrap_or_default())
}

#[actix_web::test]
async fn test_identity_header_is_injected() {
    let app = test::init_service(
        App::new()
            .wrap(TrustedIdentity::default())
            .route("/whoami", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/whoami")
        .insert_header(("x-user-id", "17"))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "17");
}

#[actix_web::test]
async fn test_missing_identity_passes_through() {
    let app = test::init_service(
        App::new()
            .wrap(TrustedIdentity::default())
            .route("/whoami", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get().uri("/whoami").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "anonymous");
}

#[actix_web::test]
async fn test_malformed_identity_is_rejected() {
    let app = test::init_service(
        App::new()
            .wrap(TrustedIdentity::default())
            .route("/whoami", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/whoami")
        .insert_header(("x-user-id", "not-a-number"))
        .to_request();
    let err = match test::try_call_service(&app, req).await {
        Ok(_) => panic!("malformed identity should be rejected"),
        Err(err) => err,
    };
    let resp = err.error_response();
    assert_eq!(resp.status().as_u16(), 401);

    let bytes = body::to_bytes(resp.into_body()).await.unwrap();
    let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.code, error_codes::IDENTITY_MISSING);
    assert_eq!(body.error_type, error_kinds::AUTHENTICATION_ERROR);
}

#[actix_web::test]
async fn test_custom_identity_header() {
    let app = test::init_service(
        App::new()
            .wrap(TrustedIdentity::new("X-Account").unwrap())
            .route("/whoami", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/whoami")
        .insert_header(("x-account", "5"))
        .insert_header(("x-user-id", "9"))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "5");
}

#[actix_web::test]
async fn test_request_id_is_propagated() {
    let app = test::init_service(
        App::new()
            .wrap(Logging)
            .wrap(RequestId::new())
            .route("/rid", web::get().to(echo_request_id)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/rid")
        .insert_header(("x-request-id", "abc-123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.headers().get("x-request-id").unwrap().to_str().unwrap(),
        "abc-123"
    );
    let body = test::read_body(resp).await;
    assert_eq!(body, "abc-123");
}

#[actix_web::test]
async fn test_request_id_is_generated() {
    let app = test::init_service(
        App::new()
            .wrap(RequestId::new())
            .route("/rid", web::get().to(echo_request_id)),
    )
    .await;

    let req = test::TestRequest::get().uri("/rid").to_request();
    let resp = test::call_service(&app, req).await;
    let header = resp
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(header.len(), 36);
}
