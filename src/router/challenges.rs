//! Challenges-related HTTP API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Router, middleware as AxumMiddleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::challenge::{
    ChallengeTemplate, CommentView, Frequency, LiveChallenge, NewTemplate, Planning,
    UserChallenge,
};
use crate::error::Result;
use crate::id::{CommentId, PlanningId, TemplateId};
use crate::ledger::{RevokeOutcome, Submission, SubmitOutcome, Totals};
use crate::middleware;
use crate::router::{Param, QueryString, Reply, Valid, declined};
use crate::user::User;
use crate::AppState;

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBody {
    #[serde(default)]
    #[validate(length(max = 120, message = "Title must contain at most 120 characters."))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 1_000_000, message = "Points must be between 0 and 1000000."))]
    pub points: Option<i64>,
    #[validate(range(
        min = 0.0,
        max = 1_000_000.0,
        message = "CO2 savings must be between 0 and 1000000."
    ))]
    pub co2_savings_points: Option<f64>,
    pub photo_required: Option<bool>,
    pub fun_fact: Option<String>,
    pub why_important: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivateBody {
    pub template_id: TemplateId,
    pub frequency: Option<Frequency>,
    #[validate(range(min = 1, max = 3650, message = "Days must be between 1 and 3650."))]
    pub days: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CommentBody {
    #[validate(length(
        min = 1,
        max = 500,
        message = "Comment must contain 1 to 500 characters."
    ))]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub frequency: Option<Frequency>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTemplate {
    template_id: TemplateId,
    template: ChallengeTemplate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPlanning {
    planning_id: PlanningId,
    planning: Planning,
}

#[derive(Debug, Serialize)]
pub struct Generated {
    created: usize,
    plannings: Vec<Planning>,
}

#[derive(Debug, Serialize)]
pub struct Challenges<T> {
    challenges: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct Submitted {
    submission: Submission,
    totals: Totals,
}

#[derive(Debug, Serialize)]
pub struct Revoked {
    totals: Totals,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Posted {
    comment_id: CommentId,
}

#[derive(Debug, Serialize)]
pub struct Comments {
    comments: Vec<CommentView>,
}

async fn create_template(
    State(state): State<AppState>,
    Valid(body): Valid<TemplateBody>,
) -> Result<Reply<CreatedTemplate>> {
    let template = state
        .catalog()
        .create_template(NewTemplate {
            title: body.title,
            description: body.description,
            points: body.points,
            co2_savings_points: body.co2_savings_points,
            photo_required: body.photo_required,
            fun_fact: body.fun_fact,
            why_important: body.why_important,
        })
        .await?;

    Ok(Reply::created(CreatedTemplate {
        template_id: template.id,
        template,
    }))
}

async fn activate(
    State(state): State<AppState>,
    Valid(body): Valid<ActivateBody>,
) -> Result<Reply<CreatedPlanning>> {
    let planning = state
        .catalog()
        .activate_planning(&body.template_id, body.frequency, body.days)
        .await?;

    Ok(Reply::created(CreatedPlanning {
        planning_id: planning.id,
        planning,
    }))
}

async fn generate(State(state): State<AppState>) -> Result<Reply<Generated>> {
    let plannings = state.catalog().generate_recurring().await?;

    Ok(Reply::created(Generated {
        created: plannings.len(),
        plannings,
    }))
}

async fn active(
    State(state): State<AppState>,
    QueryString(query): QueryString<LiveQuery>,
) -> Result<Reply<Challenges<LiveChallenge>>> {
    let challenges = state.catalog().list_live(query.frequency).await?;
    Ok(Reply::ok(Challenges { challenges }))
}

async fn user_challenges(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Reply<Challenges<UserChallenge>>> {
    let challenges = state.catalog().list_live_for_user(&user.id).await?;
    Ok(Reply::ok(Challenges { challenges }))
}

async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Param(planning): Param<PlanningId>,
    Valid(body): Valid<SubmitBody>,
) -> Result<Response> {
    match state.ledger().submit(&user, planning, body.photo_url).await? {
        SubmitOutcome::Submitted { submission, totals } => {
            Ok(Reply::created(Submitted { submission, totals }).into_response())
        },
        SubmitOutcome::AlreadySubmitted => {
            Ok(declined(StatusCode::OK, "challenge already submitted"))
        },
    }
}

async fn revoke(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Param(planning): Param<PlanningId>,
) -> Result<Response> {
    match state.ledger().revoke(&user.id, planning).await? {
        RevokeOutcome::Revoked { totals } => Ok(Reply::ok(Revoked { totals }).into_response()),
        RevokeOutcome::NothingToRevoke => Ok(declined(StatusCode::OK, "nothing to revoke")),
    }
}

async fn post_comment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Param(planning): Param<PlanningId>,
    Valid(body): Valid<CommentBody>,
) -> Result<Reply<Posted>> {
    let comment = state
        .comments()
        .post(&planning, &user.id, &body.text)
        .await?;

    Ok(Reply::created(Posted {
        comment_id: comment.id,
    }))
}

async fn list_comments(
    State(state): State<AppState>,
    Param(planning): Param<PlanningId>,
) -> Result<Reply<Comments>> {
    let comments = state.comments().list(&planning).await?;
    Ok(Reply::ok(Comments { comments }))
}

pub fn router(state: AppState) -> Router<AppState> {
    let authoring = Router::new()
        // `POST /challenges/templates` goes to `create_template`. Admin only.
        .route("/templates", post(create_template))
        // `POST /challenges` goes to `activate`. Admin only.
        .route("/", post(activate))
        // `POST /challenges/generate` goes to `generate`. Admin only.
        .route("/generate", post(generate))
        .route_layer(AxumMiddleware::from_fn(middleware::admin))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    let members = Router::new()
        .route("/userChallenges", get(user_challenges))
        .route("/{planning_id}/submit", post(submit))
        .route("/{planning_id}/submission", delete(revoke))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    Router::new()
        .route("/active", get(active))
        .route(
            "/{planning_id}/comments",
            get(list_comments).merge(post(post_comment).route_layer(
                AxumMiddleware::from_fn_with_state(state, middleware::auth),
            )),
        )
        .merge(authoring)
        .merge(members)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{Value, json};

    use crate::clock::{Clock, FixedClock};
    use crate::config::Configuration;
    use crate::router::tests;
    use crate::user::User;
    use crate::{app, body_json, make_request};

    async fn create_template(app: &axum::Router, admin: &User, body: Value) -> String {
        let response = make_request(
            app.clone(),
            Method::POST,
            "/challenges/templates",
            Some(&admin.token),
            body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["templateId"]
            .as_str()
            .unwrap()
            .to_owned()
    }

    async fn activate(app: &axum::Router, admin: &User, template: &str, days: Option<i64>) -> String {
        let response = make_request(
            app.clone(),
            Method::POST,
            "/challenges",
            Some(&admin.token),
            json!({ "templateId": template, "frequency": "daily", "days": days }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["planningId"]
            .as_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn test_authoring_is_admin_only() {
        let state = tests::state();
        let department = tests::department(&state, "Ops").await;
        let member = tests::member(&state, "hugo", &department).await;
        let app = app(state);

        let anonymous = make_request(
            app.clone(),
            Method::POST,
            "/challenges/templates",
            None,
            json!({ "title": "Stairs" }).to_string(),
        )
        .await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let forbidden = make_request(
            app,
            Method::POST,
            "/challenges/generate",
            Some(&member.token),
            String::new(),
        )
        .await;
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(forbidden).await["result"], false);
    }

    #[tokio::test]
    async fn test_template_and_planning_validation() {
        let state = tests::state();
        let admin = tests::admin(&state).await;
        let app = app(state);

        let untitled = make_request(
            app.clone(),
            Method::POST,
            "/challenges/templates",
            Some(&admin.token),
            json!({ "points": 10 }).to_string(),
        )
        .await;
        assert_eq!(untitled.status(), StatusCode::BAD_REQUEST);

        let template = create_template(&app, &admin, json!({ "title": "Stairs" })).await;

        let no_frequency = make_request(
            app.clone(),
            Method::POST,
            "/challenges",
            Some(&admin.token),
            json!({ "templateId": template }).to_string(),
        )
        .await;
        assert_eq!(no_frequency.status(), StatusCode::BAD_REQUEST);

        let bad_frequency = make_request(
            app.clone(),
            Method::POST,
            "/challenges",
            Some(&admin.token),
            json!({ "templateId": template, "frequency": "monthly" }).to_string(),
        )
        .await;
        assert_eq!(bad_frequency.status(), StatusCode::BAD_REQUEST);

        let unknown = make_request(
            app,
            Method::POST,
            "/challenges",
            Some(&admin.token),
            json!({ "templateId": crate::id::TemplateId::generate(), "frequency": "weekly" })
                .to_string(),
        )
        .await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generate_and_filter() {
        let state = tests::state();
        let admin = tests::admin(&state).await;
        let app = app(state);

        let empty = make_request(
            app.clone(),
            Method::POST,
            "/challenges/generate",
            Some(&admin.token),
            String::new(),
        )
        .await;
        assert_eq!(empty.status(), StatusCode::CONFLICT);

        create_template(&app, &admin, json!({ "title": "Meatless Monday" })).await;
        create_template(&app, &admin, json!({ "title": "Bring a mug" })).await;

        let generated = make_request(
            app.clone(),
            Method::POST,
            "/challenges/generate",
            Some(&admin.token),
            String::new(),
        )
        .await;
        assert_eq!(generated.status(), StatusCode::CREATED);
        assert_eq!(body_json(generated).await["created"], 4);

        let weekly = make_request(
            app.clone(),
            Method::GET,
            "/challenges/active?frequency=weekly",
            None,
            String::new(),
        )
        .await;
        let body = body_json(weekly).await;
        let challenges = body["challenges"].as_array().unwrap();
        assert_eq!(challenges.len(), 2);
        assert!(challenges.iter().all(|c| c["frequency"] == "weekly"));
        assert_eq!(challenges[0]["points"], 100);
        assert_eq!(challenges[0]["co2"], 0.5);

        let all = make_request(app, Method::GET, "/challenges/active", None, String::new()).await;
        assert_eq!(body_json(all).await["challenges"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_expired_planning_is_hidden() {
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let state = tests::state_with(
            Arc::clone(&clock) as Arc<dyn Clock>,
            Configuration::default(),
        );
        let admin = tests::admin(&state).await;
        let app = app(state);

        let template = create_template(&app, &admin, json!({ "title": "Unplug" })).await;
        activate(&app, &admin, &template, Some(2)).await;

        clock.set(now + Duration::days(2));
        let live = make_request(app.clone(), Method::GET, "/challenges/active", None, String::new()).await;
        assert_eq!(body_json(live).await["challenges"].as_array().unwrap().len(), 1);

        clock.set(now + Duration::days(2) + Duration::microseconds(1));
        let live = make_request(app, Method::GET, "/challenges/active", None, String::new()).await;
        assert_eq!(body_json(live).await["challenges"], json!([]));
    }

    #[tokio::test]
    async fn test_submit_revoke_scenario() {
        let state = tests::state();
        let admin = tests::admin(&state).await;
        let department = tests::department(&state, "Design").await;
        let user = tests::member(&state, "ivy", &department).await;
        let app = app(state.clone());

        let template = create_template(
            &app,
            &admin,
            json!({ "title": "Bike commute", "points": 15, "co2SavingsPoints": 2.0 }),
        )
        .await;
        let planning = activate(&app, &admin, &template, None).await;
        let submit_path = format!("/challenges/{planning}/submit");

        let anonymous = make_request(app.clone(), Method::POST, &submit_path, None, "{}".into()).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let submitted =
            make_request(app.clone(), Method::POST, &submit_path, Some(&user.token), "{}".into())
                .await;
        assert_eq!(submitted.status(), StatusCode::CREATED);
        let body = body_json(submitted).await;
        assert_eq!(
            body["totals"],
            json!({ "userPoints": 15, "userCO2": 2.0, "deptPoints": 15, "deptCO2": 2.0 })
        );

        let duplicate =
            make_request(app.clone(), Method::POST, &submit_path, Some(&user.token), "{}".into())
                .await;
        assert_eq!(duplicate.status(), StatusCode::OK);
        let body = body_json(duplicate).await;
        assert_eq!(body["result"], false);
        assert_eq!(body["error"], "challenge already submitted");

        let mine = make_request(
            app.clone(),
            Method::GET,
            "/challenges/userChallenges",
            Some(&user.token),
            String::new(),
        )
        .await;
        assert_eq!(body_json(mine).await["challenges"][0]["done"], true);

        let revoke_path = format!("/challenges/{planning}/submission");
        let revoked =
            make_request(app.clone(), Method::DELETE, &revoke_path, Some(&user.token), String::new())
                .await;
        assert_eq!(revoked.status(), StatusCode::OK);
        assert_eq!(
            body_json(revoked).await["totals"],
            json!({ "userPoints": 0, "userCO2": 0.0, "deptPoints": 0, "deptCO2": 0.0 })
        );

        let again =
            make_request(app, Method::DELETE, &revoke_path, Some(&user.token), String::new()).await;
        assert_eq!(body_json(again).await["error"], "nothing to revoke");

        let department = state
            .db
            .store
            .find_department(&department.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(department.total_points, 0);
    }

    #[tokio::test]
    async fn test_comments() {
        let state = tests::state();
        let admin = tests::admin(&state).await;
        let department = tests::department(&state, "Sales").await;
        let user = tests::member(&state, "jade", &department).await;
        let app = app(state);

        let template = create_template(&app, &admin, json!({ "title": "Lights off" })).await;
        let planning = activate(&app, &admin, &template, None).await;
        let path = format!("/challenges/{planning}/comments");

        let anonymous = make_request(
            app.clone(),
            Method::POST,
            &path,
            None,
            json!({ "text": "hi" }).to_string(),
        )
        .await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let too_long = make_request(
            app.clone(),
            Method::POST,
            &path,
            Some(&user.token),
            json!({ "text": "x".repeat(501) }).to_string(),
        )
        .await;
        assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);

        let posted = make_request(
            app.clone(),
            Method::POST,
            &path,
            Some(&user.token),
            json!({ "text": "Done before lunch" }).to_string(),
        )
        .await;
        assert_eq!(posted.status(), StatusCode::CREATED);

        let listed = make_request(app, Method::GET, &path, None, String::new()).await;
        assert_eq!(listed.status(), StatusCode::OK);
        let body = body_json(listed).await;
        assert_eq!(body["comments"][0]["user"], "jade");
        assert_eq!(body["comments"][0]["text"], "Done before lunch");
    }

    #[tokio::test]
    async fn test_malformed_path_and_query_are_json() {
        let app = app(tests::state());

        let bad_id = make_request(
            app.clone(),
            Method::GET,
            "/challenges/not-a-uuid/comments",
            None,
            String::new(),
        )
        .await;
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
        let body = body_json(bad_id).await;
        assert_eq!(body["result"], false);
        assert!(body["error"].is_string());

        let bad_filter = make_request(
            app,
            Method::GET,
            "/challenges/active?frequency=monthly",
            None,
            String::new(),
        )
        .await;
        assert_eq!(bad_filter.status(), StatusCode::BAD_REQUEST);
        let body = body_json(bad_filter).await;
        assert_eq!(body["result"], false);
        assert!(body["error"].is_string());
    }
}
