use crate::{
    api::{
        appraisal, audit_log, employee, employee_status, grid_view, health, leave_request,
        notification, onboarding, reference, role, rota, settings, supervision, supervision_exception,
        supervision_requirement, training_course, training_record, user,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = 60_000 / requests_per_min.max(1) as u64;
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(GovernorConfig::default);
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );
    cfg.service(
        web::resource(format!("{}/health", config.api_prefix)).route(web::get().to(health::health)),
    );

    // Protected routes. Literal segments are registered before `/{id}`.
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(web::resource("/auth/me").route(web::get().to(handlers::me)))
            .service(
                web::resource("/auth/change-password").route(web::post().to(handlers::change_password)),
            )
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::get().to(employee::list_employees))
                            .route(web::post().to(employee::create_employee)),
                    )
                    .service(web::resource("/roles").route(web::get().to(employee::list_roles)))
                    .service(
                        web::resource("/{employee_id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(
                        web::resource("/{employee_id}/purge")
                            .route(web::delete().to(employee::purge_employee)),
                    )
                    .service(
                        web::resource("/{employee_id}/references")
                            .route(web::get().to(reference::list_references))
                            .route(web::post().to(reference::create_reference)),
                    ),
            )
            .service(
                web::resource("/references/{id}")
                    .route(web::put().to(reference::update_reference))
                    .route(web::delete().to(reference::delete_reference)),
            )
            .service(
                web::scope("/employee-statuses")
                    .service(
                        web::resource("")
                            .route(web::get().to(employee_status::list_statuses))
                            .route(web::post().to(employee_status::create_status)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee_status::update_status))
                            .route(web::delete().to(employee_status::delete_status)),
                    ),
            )
            .service(
                web::scope("/training-courses")
                    .service(
                        web::resource("")
                            .route(web::get().to(training_course::list_courses))
                            .route(web::post().to(training_course::create_course)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(training_course::get_course))
                            .route(web::put().to(training_course::update_course))
                            .route(web::delete().to(training_course::delete_course)),
                    ),
            )
            .service(
                web::scope("/training-records")
                    .service(
                        web::resource("")
                            .route(web::get().to(training_record::list_records))
                            .route(web::post().to(training_record::create_record)),
                    )
                    .service(web::resource("/status").route(web::get().to(training_record::status_matrix)))
                    .service(web::resource("/expiring").route(web::get().to(training_record::expiring)))
                    .service(web::resource("/{id}").route(web::delete().to(training_record::delete_record))),
            )
            .service(
                web::scope("/supervisions")
                    .service(
                        web::resource("")
                            .route(web::get().to(supervision::list_supervisions))
                            .route(web::post().to(supervision::create_supervision)),
                    )
                    .service(web::resource("/matrix").route(web::get().to(supervision::supervision_matrix)))
                    .service(web::resource("/status").route(web::get().to(supervision::supervision_status)))
                    .service(web::resource("/summary").route(web::get().to(supervision::supervision_summary)))
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(supervision::update_supervision))
                            .route(web::delete().to(supervision::delete_supervision)),
                    ),
            )
            .service(
                web::scope("/supervision-exceptions")
                    .service(
                        web::resource("")
                            .route(web::get().to(supervision_exception::list_exceptions))
                            .route(web::post().to(supervision_exception::create_exception)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::delete().to(supervision_exception::delete_exception)),
                    ),
            )
            .service(
                web::scope("/supervision-requirements")
                    .service(
                        web::resource("")
                            .route(web::get().to(supervision_requirement::list_requirements))
                            .route(web::post().to(supervision_requirement::create_requirement)),
                    )
                    .service(
                        web::resource("/effective")
                            .route(web::get().to(supervision_requirement::effective_requirement)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(supervision_requirement::update_requirement))
                            .route(web::delete().to(supervision_requirement::delete_requirement)),
                    ),
            )
            .service(
                web::scope("/onboarding")
                    .service(
                        web::resource("/items")
                            .route(web::get().to(onboarding::list_items))
                            .route(web::post().to(onboarding::create_item)),
                    )
                    .service(
                        web::resource("/items/{id}")
                            .route(web::put().to(onboarding::update_item))
                            .route(web::delete().to(onboarding::delete_item)),
                    )
                    .service(
                        web::resource("/employees/{employee_id}")
                            .route(web::get().to(onboarding::employee_records)),
                    )
                    .service(
                        web::resource("/employees/{employee_id}/items/{item_id}")
                            .route(web::put().to(onboarding::set_status)),
                    ),
            )
            .service(
                web::scope("/appraisals")
                    .service(
                        web::resource("")
                            .route(web::get().to(appraisal::list_appraisals))
                            .route(web::post().to(appraisal::create_appraisal)),
                    )
                    .service(web::resource("/matrix").route(web::get().to(appraisal::appraisal_matrix)))
                    .service(
                        web::resource("/generate/{employee_id}")
                            .route(web::post().to(appraisal::generate_next)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(appraisal::update_appraisal))
                            .route(web::delete().to(appraisal::delete_appraisal)),
                    ),
            )
            .service(
                web::scope("/rota")
                    .service(web::resource("/shift-types").route(web::get().to(rota::list_shift_types)))
                    .service(web::resource("/month").route(web::get().to(rota::get_month)))
                    .service(web::resource("/shifts").route(web::post().to(rota::upsert_shift)))
                    .service(
                        web::resource("/shifts/{id}")
                            .route(web::put().to(rota::update_shift))
                            .route(web::delete().to(rota::delete_shift)),
                    )
                    .service(
                        web::resource("/monthly-hours")
                            .route(web::get().to(rota::list_monthly_hours))
                            .route(web::put().to(rota::set_monthly_hours)),
                    ),
            )
            .service(
                web::scope("/leave")
                    .service(
                        web::resource("/requests")
                            .route(web::get().to(leave_request::list_requests))
                            .route(web::post().to(leave_request::create_request)),
                    )
                    .service(web::resource("/requests/{id}").route(web::get().to(leave_request::get_request)))
                    .service(
                        web::resource("/requests/{id}/status")
                            .route(web::put().to(leave_request::update_status)),
                    )
                    .service(
                        web::resource("/balance/{employee_id}")
                            .route(web::get().to(leave_request::get_balance)),
                    )
                    .service(
                        web::resource("/entitlements").route(web::put().to(leave_request::set_entitlement)),
                    )
                    .service(
                        web::resource("/entitlements/{employee_id}")
                            .route(web::get().to(leave_request::list_entitlements)),
                    ),
            )
            .service(
                web::scope("/grid-views")
                    .service(
                        web::resource("")
                            .route(web::get().to(grid_view::list_views))
                            .route(web::post().to(grid_view::create_view)),
                    )
                    .service(web::resource("/default").route(web::get().to(grid_view::default_view)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(grid_view::get_view))
                            .route(web::put().to(grid_view::update_view))
                            .route(web::delete().to(grid_view::delete_view)),
                    ),
            )
            .service(
                web::scope("/notifications")
                    .service(web::resource("/pending").route(web::get().to(notification::list_pending)))
                    .service(web::resource("/send").route(web::post().to(notification::send_notifications)))
                    .service(
                        web::resource("/log")
                            .route(web::get().to(notification::list_log))
                            .route(web::delete().to(notification::clear_log)),
                    ),
            )
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::get().to(user::list_users))
                            .route(web::post().to(user::create_user)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(user::get_user))
                            .route(web::put().to(user::update_user)),
                    )
                    .service(
                        web::resource("/{id}/reset-password").route(web::post().to(user::reset_password)),
                    ),
            )
            .service(
                web::scope("/roles")
                    .service(web::resource("").route(web::get().to(role::list_account_roles)))
                    .service(web::resource("/permissions").route(web::get().to(role::list_permissions))),
            )
            .service(
                web::resource("/settings")
                    .route(web::get().to(settings::get_settings))
                    .route(web::put().to(settings::update_settings)),
            )
            .service(web::resource("/audit-log").route(web::get().to(audit_log::list_audit_log))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use actix_web::{App, http::StatusCode, test, web::Data};
    use sqlx::MySqlPool;

    #[actix_web::test]
    async fn protected_routes_require_a_token() {
        let config = test_config();
        let pool = MySqlPool::connect_lazy(&config.database_url).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(pool))
                .app_data(Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        for uri in [
            "/api/employees",
            "/api/training-records/status",
            "/api/supervisions/matrix",
            "/api/supervisions/summary",
            "/api/roles",
        ] {
            let req = test::TestRequest::get()
                .uri(uri)
                .peer_addr("127.0.0.1:12345".parse().unwrap())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[actix_web::test]
    async fn garbage_bearer_token_is_rejected() {
        let config = test_config();
        let pool = MySqlPool::connect_lazy(&config.database_url).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(pool))
                .app_data(Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .peer_addr("127.0.0.1:12345".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn login_limiter_throttles_repeat_callers() {
        let mut config = test_config();
        config.rate_login_per_min = 1;
        let pool = MySqlPool::connect_lazy(&config.database_url).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(pool))
                .app_data(Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        // logout without a token never reaches the database
        let logout = || {
            test::TestRequest::post()
                .uri("/auth/logout")
                .peer_addr("127.0.0.1:12345".parse().unwrap())
                .to_request()
        };
        let first = test::call_service(&app, logout()).await;
        assert_eq!(first.status(), StatusCode::NO_CONTENT);
        let second = test::call_service(&app, logout()).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
