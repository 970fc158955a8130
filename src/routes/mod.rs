use actix_web::{error::JsonPayloadError, web, HttpRequest};

use crate::errors::ApiError;
use crate::middleware::auth::AuthMiddleware;

pub mod auth;
pub mod chat;
pub mod friends;
pub mod generate;
pub mod health;
pub mod location;
pub mod plans;
pub mod profiles;

/// Malformed JSON bodies answer with the same `{"error": ...}` shape as
/// every other failure.
pub fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::bad_request(format!("JSON inválido: {}", err)).into()
}

/// Registers every route. Handlers that mix public and private methods on the
/// same path authenticate through the `AuthenticatedUser` extractor; the
/// remaining private routes sit behind `AuthMiddleware`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .route("/register", web::post().to(auth::register))
                        .route("/login", web::post().to(auth::login))
                        .service(
                            web::scope("")
                                .wrap(AuthMiddleware)
                                .route("/session", web::get().to(auth::session)),
                        ),
                )
                .route("/profiles/{slug}", web::get().to(profiles::public_profile))
                .route("/location/resolve", web::post().to(location::resolve))
                .service(
                    web::scope("/plans")
                        .route("/feed", web::get().to(plans::feed))
                        .route("/mine", web::get().to(plans::mine))
                        .route("/saved", web::get().to(plans::saved))
                        .route("/share/{code}", web::get().to(plans::by_share_code))
                        .service(
                            web::resource("/{id}")
                                .route(web::get().to(plans::detail))
                                .route(web::patch().to(plans::update))
                                .route(web::delete().to(plans::delete)),
                        )
                        .service(
                            web::resource("/{id}/like")
                                .route(web::post().to(plans::like))
                                .route(web::delete().to(plans::unlike)),
                        )
                        .service(
                            web::resource("/{id}/save")
                                .route(web::post().to(plans::save))
                                .route(web::delete().to(plans::unsave)),
                        )
                        .service(
                            web::resource("/{id}/comments")
                                .route(web::get().to(plans::comments))
                                .route(web::post().to(plans::add_comment)),
                        )
                        .route(
                            "/{id}/comments/{comment_id}",
                            web::delete().to(plans::delete_comment),
                        ),
                )
                // Protected routes
                .service(
                    web::scope("")
                        .wrap(AuthMiddleware)
                        .route("/generate-plan", web::post().to(generate::generate_plan))
                        .service(
                            web::resource("/profile")
                                .route(web::get().to(profiles::get_profile))
                                .route(web::put().to(profiles::update_profile)),
                        )
                        .route("/me/counts", web::get().to(friends::counts))
                        .service(
                            web::scope("/friends")
                                .route("", web::get().to(friends::list_friends))
                                .service(
                                    web::resource("/requests")
                                        .route(web::get().to(friends::list_requests))
                                        .route(web::post().to(friends::send_request)),
                                )
                                .route(
                                    "/requests/{id}/accept",
                                    web::post().to(friends::accept_request),
                                )
                                .route(
                                    "/requests/{id}/reject",
                                    web::post().to(friends::reject_request),
                                )
                                .route(
                                    "/requests/{id}/cancel",
                                    web::post().to(friends::cancel_request),
                                )
                                .route("/{user_id}", web::delete().to(friends::remove_friend)),
                        )
                        .service(
                            web::scope("/chat")
                                .route("", web::get().to(chat::conversations))
                                .service(
                                    web::resource("/{friend_id}")
                                        .route(web::get().to(chat::poll_messages))
                                        .route(web::post().to(chat::send_message)),
                                ),
                        ),
                ),
        );
}
