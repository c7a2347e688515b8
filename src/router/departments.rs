//! Departments-related HTTP API.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Router, middleware as AxumMiddleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::department::Department;
use crate::error::Result;
use crate::id::DepartmentId;
use crate::middleware;
use crate::router::{Param, Reply, Valid};
use crate::user::User;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateBody {
    #[validate(length(min = 1, max = 64, message = "Name must contain 1 to 64 characters."))]
    pub name: String,
}

/// Listing entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    id: DepartmentId,
    name: String,
    total_points: i64,
}

#[derive(Debug, Serialize)]
pub struct Listing {
    departments: Vec<Summary>,
}

#[derive(Debug, Serialize)]
pub struct Single {
    department: Department,
}

#[derive(Debug, Serialize)]
pub struct Recalculated {
    recalculated: usize,
}

async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<CreateBody>,
) -> Result<Reply<Single>> {
    let department = state.directory().create(&body.name).await?;
    Ok(Reply::created(Single { department }))
}

async fn list(State(state): State<AppState>) -> Result<Reply<Listing>> {
    let departments = state
        .directory()
        .list_active()
        .await?
        .into_iter()
        .map(|department| Summary {
            id: department.id,
            name: department.name,
            total_points: department.total_points,
        })
        .collect();

    Ok(Reply::ok(Listing { departments }))
}

async fn find(
    State(state): State<AppState>,
    Param(name): Param<String>,
) -> Result<Reply<Single>> {
    let department = state.directory().find_by_name(&name).await?;
    Ok(Reply::ok(Single { department }))
}

async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Reply<Single>> {
    let department = state.directory().stats(&user).await?;
    Ok(Reply::ok(Single { department }))
}

async fn recalculate(State(state): State<AppState>) -> Result<Reply<Recalculated>> {
    let recalculated = state.directory().recalculate_all().await?;
    Ok(Reply::ok(Recalculated { recalculated }))
}

pub fn router(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        // `GET /depts/department-stats` goes to `stats`. Authorization required.
        .route("/department-stats", get(stats))
        .route_layer(AxumMiddleware::from_fn_with_state(state, middleware::auth));

    Router::new()
        .route("/", get(list))
        .route("/create", post(create))
        .route("/recalculate-departments", post(recalculate))
        .route("/{name}", get(find))
        .merge(authenticated)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::router::tests;
    use crate::{app, body_json, make_request};

    #[tokio::test]
    async fn test_create_then_find() {
        let state = tests::state();
        let app = app(state);

        let response = make_request(
            app.clone(),
            Method::POST,
            "/depts/create",
            None,
            json!({ "name": "Procurement" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["department"]["isActive"], false);

        let again = make_request(
            app.clone(),
            Method::POST,
            "/depts/create",
            None,
            json!({ "name": "Procurement" }).to_string(),
        )
        .await;
        assert_eq!(again.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(again).await["result"], false);

        let found =
            make_request(app.clone(), Method::GET, "/depts/Procurement", None, String::new()).await;
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(body_json(found).await["department"]["name"], "Procurement");

        // Lookup is case-sensitive.
        let missing =
            make_request(app.clone(), Method::GET, "/depts/procurement", None, String::new()).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        // Inactive departments are not listed.
        let listed = make_request(app, Method::GET, "/depts", None, String::new()).await;
        assert_eq!(body_json(listed).await["departments"], json!([]));
    }

    #[tokio::test]
    async fn test_listing_and_stats() {
        let state = tests::state();
        let department = tests::department(&state, "Research").await;
        let user = tests::member(&state, "gina", &department).await;
        state
            .db
            .store
            .increment_user_totals(&user.id, 12, 1.0)
            .await
            .unwrap();
        let app = app(state);

        let response = make_request(
            app.clone(),
            Method::POST,
            "/depts/recalculate-departments",
            None,
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["recalculated"], 1);

        let listed = make_request(app.clone(), Method::GET, "/depts", None, String::new()).await;
        let body = body_json(listed).await;
        assert_eq!(
            body["departments"],
            json!([{ "id": department.id, "name": "Research", "totalPoints": 12 }])
        );

        let stats = make_request(
            app,
            Method::GET,
            "/depts/department-stats",
            Some(&user.token),
            String::new(),
        )
        .await;
        assert_eq!(stats.status(), StatusCode::OK);
        assert_eq!(body_json(stats).await["department"]["totalCo2SavingsPoints"], 1.0);
    }
}
