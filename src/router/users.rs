//! Users-related HTTP API.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Router, middleware as AxumMiddleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::department::Department;
use crate::error::Result;
use crate::id::DepartmentId;
use crate::middleware;
use crate::router::{Reply, Valid};
use crate::user::{Credentials, User};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupBody {
    #[validate(length(
        min = 2,
        max = 32,
        message = "Username must contain 2 to 32 characters."
    ))]
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    pub department_id: DepartmentId,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AdminSignupBody {
    #[validate(length(
        min = 2,
        max = 32,
        message = "Username must contain 2 to 32 characters."
    ))]
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SigninBody {
    /// Username or email.
    #[validate(length(min = 1, message = "Missing credentials."))]
    pub credentials: String,
    #[validate(length(min = 1, message = "Missing password."))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Session {
    token: String,
    user: User,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    user: User,
    department: Option<Department>,
}

#[derive(Debug, Serialize)]
pub struct Team {
    department: Department,
    members: Vec<User>,
}

fn session(user: User) -> Session {
    Session {
        token: user.token.clone(),
        user,
    }
}

/// Handler to create a department member.
async fn signup(
    State(state): State<AppState>,
    Valid(body): Valid<SignupBody>,
) -> Result<Reply<Session>> {
    let user = state
        .identity()
        .signup(
            Credentials {
                username: &body.username,
                email: &body.email,
                password: &body.password,
            },
            body.department_id,
        )
        .await?;

    Ok(Reply::created(session(user)))
}

/// Handler to create an administrator.
async fn admin_signup(
    State(state): State<AppState>,
    Valid(body): Valid<AdminSignupBody>,
) -> Result<Reply<Session>> {
    let user = state
        .identity()
        .admin_signup(Credentials {
            username: &body.username,
            email: &body.email,
            password: &body.password,
        })
        .await?;

    Ok(Reply::created(session(user)))
}

async fn signin(
    State(state): State<AppState>,
    Valid(body): Valid<SigninBody>,
) -> Result<Reply<Session>> {
    let user = state
        .identity()
        .signin(&body.credentials, &body.password)
        .await?;

    Ok(Reply::ok(session(user)))
}

async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Reply<Profile>> {
    let department = match user.department_id {
        Some(id) => state.db.store.find_department(&id).await?,
        None => None,
    };

    Ok(Reply::ok(Profile { user, department }))
}

async fn team(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Reply<Team>> {
    let department = state.directory().stats(&user).await?;
    let (department, members) = state.directory().team(&department.id).await?;

    Ok(Reply::ok(Team {
        department,
        members,
    }))
}

pub fn router(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        // `GET /users/me` goes to `me`. Authorization required.
        .route("/me", get(me))
        // `GET /users/team` goes to `team`. Authorization required.
        .route("/team", get(team))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    let admin = Router::new()
        .route("/admin-signup", post(admin_signup))
        .route_layer(AxumMiddleware::from_fn_with_state(state, middleware::admin_key));

    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .merge(authenticated)
        .merge(admin)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::router::tests::{self, ADMIN_SIGNUP_KEY};
    use crate::{app, body_json, make_request};

    #[tokio::test]
    async fn test_signup_and_signin() {
        let state = tests::state();
        let department = tests::department(&state, "Finance").await;
        let app = app(state.clone());

        let response = make_request(
            app.clone(),
            Method::POST,
            "/users/signup",
            None,
            json!({
                "username": "Alice",
                "email": "Alice@Corp.io",
                "password": "long enough",
                "departmentId": department.id,
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["result"], true);
        assert_eq!(body["user"]["username"], "alice");
        assert_eq!(body["user"]["totalPoints"], 0);
        assert!(body["user"].get("password").is_none());
        let token = body["token"].as_str().unwrap().to_owned();
        assert_eq!(token.len(), 64);

        let response = make_request(
            app.clone(),
            Method::POST,
            "/users/signin",
            None,
            json!({ "credentials": "alice@corp.io", "password": "long enough" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["token"], token);

        let response = make_request(
            app,
            Method::POST,
            "/users/signin",
            None,
            json!({ "credentials": "alice", "password": "wrong password" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["result"], false);
    }

    #[tokio::test]
    async fn test_signup_rejections() {
        let state = tests::state();
        let department = tests::department(&state, "Finance").await;
        tests::member(&state, "bob", &department).await;
        let app = app(state);

        let duplicate = make_request(
            app.clone(),
            Method::POST,
            "/users/signup",
            None,
            json!({
                "username": "BOB",
                "email": "another@corp.io",
                "password": "long enough",
                "departmentId": department.id,
            })
            .to_string(),
        )
        .await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(duplicate).await["error"], "username already taken");

        let weak = make_request(
            app.clone(),
            Method::POST,
            "/users/signup",
            None,
            json!({
                "username": "carl",
                "email": "carl@corp.io",
                "password": "short",
                "departmentId": department.id,
            })
            .to_string(),
        )
        .await;
        assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(weak).await["errors"][0]["field"], "password");

        let unknown_department = make_request(
            app,
            Method::POST,
            "/users/signup",
            None,
            json!({
                "username": "dana",
                "email": "dana@corp.io",
                "password": "long enough",
                "departmentId": crate::id::DepartmentId::generate(),
            })
            .to_string(),
        )
        .await;
        assert_eq!(unknown_department.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_signup_requires_key() {
        let state = tests::state();
        let app = app(state);
        let body = json!({
            "username": "boss",
            "email": "boss@corp.io",
            "password": "long enough",
        })
        .to_string();

        let response =
            make_request(app.clone(), Method::POST, "/users/admin-signup", None, body.clone())
                .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = crate::make_request_with(
            app,
            Method::POST,
            "/users/admin-signup",
            &[("x-admin-key", ADMIN_SIGNUP_KEY)],
            body,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["user"]["isAdmin"], true);
        assert_eq!(body["user"]["departmentId"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_me_and_team() {
        let state = tests::state();
        let department = tests::department(&state, "Legal").await;
        let erin = tests::member(&state, "erin", &department).await;
        let fred = tests::member(&state, "fred", &department).await;
        state
            .db
            .store
            .increment_user_totals(&fred.id, 30, 3.0)
            .await
            .unwrap();
        let app = app(state);

        let response = make_request(app.clone(), Method::GET, "/users/me", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            app.clone(),
            Method::GET,
            "/users/me",
            Some(&erin.token),
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user"]["username"], "erin");
        assert_eq!(body["department"]["name"], "Legal");

        let response =
            make_request(app, Method::GET, "/users/team", Some(&erin.token), String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["department"]["totalPoints"], 30);
        assert_eq!(body["members"][0]["username"], "fred");
        assert_eq!(body["members"][1]["username"], "erin");
    }
}
