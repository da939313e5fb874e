use crate::{
    api::{
        attendance, audit, dashboard, departments, late_request, layouts, leave_request, notifications,
        overtime_request, payroll, profile, requests, settings, tasks, users,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Per-peer-IP limiter allowing `requests_per_min` with an equal burst.
fn build_limiter(requests_per_min: u32) -> Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / requests_per_min as u64).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Arc::new(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = build_limiter(config.rate_login_per_min);
    let refresh_limiter = build_limiter(config.rate_refresh_per_min);
    let protected_limiter = build_limiter(config.rate_protected_per_min);

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(web::resource("/account/password").route(web::put().to(handlers::change_password)))
            .service(
                web::scope("/users")
                    .service(web::resource("").route(web::get().to(users::list_users)))
                    .service(web::resource("/active").route(web::get().to(users::active_users)))
                    .service(web::resource("/password-resets").route(web::get().to(users::password_reset_history)))
                    .service(web::resource("/{id}").route(web::get().to(users::user_details)))
                    .service(web::resource("/{id}/toggle-status").route(web::put().to(users::toggle_user_status)))
                    .service(web::resource("/{id}/reset-password").route(web::put().to(users::reset_user_password)))
                    .service(web::resource("/{id}/tasks").route(web::get().to(users::user_tasks))),
            )
            .service(
                web::scope("/departments")
                    .service(
                        web::resource("")
                            .route(web::get().to(departments::list_departments))
                            .route(web::post().to(departments::create_department)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(departments::department_details))
                            .route(web::put().to(departments::update_department))
                            .route(web::delete().to(departments::delete_department)),
                    )
                    .service(web::resource("/{id}/toggle-status").route(web::put().to(departments::toggle_department)))
                    .service(web::resource("/{id}/announce").route(web::post().to(departments::announce))),
            )
            .service(
                web::scope("/tasks")
                    .service(
                        web::resource("")
                            .route(web::get().to(tasks::list_tasks))
                            .route(web::post().to(tasks::create_task)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(tasks::task_details))
                            .route(web::put().to(tasks::update_task))
                            .route(web::delete().to(tasks::delete_task)),
                    )
                    .service(web::resource("/{id}/toggle-status").route(web::put().to(tasks::toggle_task))),
            )
            .service(
                web::scope("/my/tasks")
                    .service(web::resource("").route(web::get().to(tasks::my_tasks)))
                    .service(web::resource("/summary").route(web::get().to(tasks::my_tasks_summary)))
                    .service(web::resource("/{id}").route(web::get().to(tasks::task_detail)))
                    .service(web::resource("/{id}/progress").route(web::put().to(tasks::update_progress))),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
                    .service(web::resource("/check-out").route(web::post().to(attendance::check_out)))
                    .service(web::resource("/history").route(web::get().to(attendance::my_history)))
                    .service(web::resource("/by-date").route(web::get().to(attendance::list_by_date)))
                    .service(web::resource("/report").route(web::get().to(attendance::attendance_report)))
                    .service(web::resource("/reverse-geocode").route(web::get().to(attendance::reverse_geocode))),
            )
            .service(
                web::scope("/leave-requests")
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    .service(web::resource("/mine").route(web::get().to(leave_request::my_leaves)))
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(web::resource("/{id}/approve").route(web::put().to(leave_request::approve_leave)))
                    .service(web::resource("/{id}/reject").route(web::put().to(leave_request::reject_leave))),
            )
            .service(
                web::scope("/overtime-requests")
                    .service(
                        web::resource("")
                            .route(web::get().to(overtime_request::overtime_list))
                            .route(web::post().to(overtime_request::create_overtime)),
                    )
                    .service(web::resource("/mine").route(web::get().to(overtime_request::my_overtime)))
                    .service(web::resource("/{id}").route(web::get().to(overtime_request::get_overtime)))
                    .service(web::resource("/{id}/approve").route(web::put().to(overtime_request::approve_overtime)))
                    .service(web::resource("/{id}/reject").route(web::put().to(overtime_request::reject_overtime))),
            )
            .service(
                web::scope("/late-requests")
                    .service(
                        web::resource("")
                            .route(web::get().to(late_request::late_list))
                            .route(web::post().to(late_request::create_late)),
                    )
                    .service(web::resource("/mine").route(web::get().to(late_request::my_late)))
                    .service(web::resource("/{id}").route(web::get().to(late_request::get_late)))
                    .service(web::resource("/{id}/approve").route(web::put().to(late_request::approve_late)))
                    .service(web::resource("/{id}/reject").route(web::put().to(late_request::reject_late))),
            )
            .service(web::resource("/requests/pending-count").route(web::get().to(requests::pending_counts)))
            .service(
                web::scope("/payroll")
                    .service(web::resource("").route(web::get().to(payroll::list_payrolls)))
                    .service(web::resource("/mine").route(web::get().to(payroll::my_payroll)))
                    .service(web::resource("/recalculate").route(web::post().to(payroll::recalculate_payroll))),
            )
            .service(
                web::scope("/settings")
                    .service(
                        web::resource("")
                            .route(web::get().to(settings::list_settings))
                            .route(web::put().to(settings::batch_update)),
                    )
                    .service(web::resource("/export").route(web::get().to(settings::export_settings)))
                    .service(web::resource("/import").route(web::post().to(settings::import_settings)))
                    .service(web::resource("/reset").route(web::post().to(settings::reset_settings)))
                    .service(web::resource("/custom-assets").route(web::get().to(settings::custom_assets)))
                    .service(
                        web::resource("/{key}")
                            .route(web::get().to(settings::get_setting))
                            .route(web::put().to(settings::update_setting))
                            .route(web::delete().to(settings::delete_setting)),
                    ),
            )
            .service(
                web::scope("/layouts")
                    .service(web::resource("/backups").route(web::get().to(layouts::list_backups)))
                    .service(
                        web::resource("/backups/{name}")
                            .route(web::get().to(layouts::get_backup))
                            .route(web::delete().to(layouts::delete_backup)),
                    )
                    .service(web::resource("/backups/{name}/restore").route(web::post().to(layouts::restore_backup)))
                    .service(
                        web::resource("/{kind}")
                            .route(web::get().to(layouts::get_layout))
                            .route(web::put().to(layouts::save_layout)),
                    ),
            )
            .service(web::resource("/audit-logs").route(web::get().to(audit::audit_logs)))
            .service(
                web::scope("/login-history")
                    .service(web::resource("").route(web::get().to(audit::login_history)))
                    .service(web::resource("/mine").route(web::get().to(audit::my_logins))),
            )
            .service(
                web::scope("/dashboard")
                    .service(web::resource("/admin").route(web::get().to(dashboard::admin_dashboard)))
                    .service(web::resource("/staff").route(web::get().to(dashboard::staff_dashboard))),
            )
            .service(
                web::scope("/profile")
                    .service(
                        web::resource("")
                            .route(web::get().to(profile::my_profile))
                            .route(web::put().to(profile::update_profile)),
                    )
                    .service(web::resource("/department").route(web::get().to(profile::my_department))),
            )
            .service(
                web::resource("/notifications/stream").route(web::get().to(notifications::stream_notifications)),
            ),
    );
}

// LOGIN
//  ├─ access_token (ACCESS_TOKEN_TTL)
//  └─ refresh_token (REFRESH_TOKEN_TTL), persisted by jti

// API REQUEST
//  └─ Authorization: Bearer access_token  (or ?access_token= for the event stream)

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ old jti revoked, new pair returned
