/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `store`.)

Everything but logging in and signing up goes through `POST /api`, with
the operation named in the `x-registrar-action` header and its arguments
(if any) as a JSON body, or CSV for the bulk uploads.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, Request, StatusCode},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{self, AuthResult, Claims},
    config::Glob,
    perm::{permits, Action},
    user::Role,
    workflow::Error,
};

pub mod manager;
pub mod records;
pub mod student;
pub mod subject;
pub mod teacher;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

static ACTION_HEADER: &str = "x-registrar-action";
static REQUEST_ID_HEADER: &str = "x-registrar-request-id";

pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

pub fn respond_unauthorized(msg: String) -> Response {
    log::trace!("respond_unauthorized( {:?} ) called.", &msg);

    (
        StatusCode::UNAUTHORIZED,
        msg
    ).into_response()
}

fn action_header(action: Action) -> [(HeaderName, HeaderValue); 1] {
    [(
        HeaderName::from_static(ACTION_HEADER),
        HeaderValue::from_static(action.as_str()),
    )]
}

/// Serialize `data` as the JSON body of a response to `action`.
pub fn respond_json<T: Serialize>(code: StatusCode, action: Action, data: &T) -> Response {
    (
        code,
        action_header(action),
        Json(data),
    ).into_response()
}

pub fn respond_forbidden(action: Action, msg: String) -> Response {
    log::trace!("respond_forbidden( {}, {:?} ) called.", &action, &msg);

    (
        StatusCode::FORBIDDEN,
        action_header(action),
        msg,
    ).into_response()
}

/// The HTTP status with which each kind of failure is reported.
pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::NotFound(..) |
        Error::NotEnrolled { .. } => StatusCode::NOT_FOUND,
        Error::DuplicateEnrollment { .. } |
        Error::DuplicateUsername(_) |
        Error::HierarchyCycle { .. } => StatusCode::CONFLICT,
        Error::CapacityExceeded { .. } |
        Error::PromotionDenied { .. } |
        Error::MaxLevelReached(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Invalid(_) => StatusCode::BAD_REQUEST,
        Error::ConsistencyViolation { .. } |
        Error::Auth(_) |
        Error::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Internal failures are logged and reported without detail; everything
/// else goes back to the caller as the error's message.
pub fn respond_error(action: Action, e: &Error) -> Response {
    let code = status_for(e);
    match e {
        Error::Db(_) | Error::Auth(_) => {
            log::error!("Error during {}: {}", &action, e);
            return text_500(None);
        },
        Error::ConsistencyViolation { .. } => {
            log::error!("Error during {}: {}", &action, e);
        },
        _ => {
            log::trace!("{} fails with {}: {}", &action, &code, e);
        },
    }

    (
        code,
        action_header(action),
        e.to_string(),
    ).into_response()
}

/// Deserialize a JSON request body, or explain (with a 400) why not.
pub fn parse_body<T: DeserializeOwned>(body: Option<String>) -> Result<T, Response> {
    let body = match body {
        Some(body) if !body.trim().is_empty() => body,
        _ => {
            return Err(respond_bad_request("Request requires a JSON body.".to_owned()));
        },
    };

    serde_json::from_str(&body).map_err(|e| {
        respond_bad_request(format!("Unable to deserialize request body: {}", &e))
    })
}

/// Body of requests naming a single record.
#[derive(Debug, Deserialize)]
pub struct IdData {
    pub id: i64,
}

/// Middleware function to ensure an `x-registrar-request-id` header sent
/// with a request comes back on the response.
pub async fn request_identity<B>(
    req: Request<B>,
    next: Next<B>
) -> Response {
    let id_header = req.headers().get(REQUEST_ID_HEADER).cloned();

    let mut response = next.run(req).await;
    if let Some(id) = id_header {
        response.headers_mut().insert(REQUEST_ID_HEADER, id);
    }
    response
}

/**
Validates `token` and checks it against the user as currently stored.

A token whose holder has since been deleted is refused, and the role in
the returned `Claims` is the holder's present one, not the one it was
issued with.
*/
async fn current_claims(glob: &Glob, token: &str) -> Result<Claims, Response> {
    let mut claims = match glob.issuer.validate(token) {
        Ok(claims) => claims,
        Err(e) => {
            log::info!("Rejected token: {}", &e);
            return Err(respond_unauthorized(e.to_string()));
        },
    };

    match glob.store.get_user(claims.uid).await {
        Ok(Some(u)) if u.uname() == claims.sub => {
            if u.role() != claims.role {
                log::trace!(
                    "{:?} was issued a {} token but is now {}.",
                    &claims.sub, &claims.role, &u.role()
                );
                claims.role = u.role();
            }
            Ok(claims)
        },
        Ok(_) => {
            log::info!("Rejected token for departed user {:?} ({}).", &claims.sub, &claims.uid);
            Err(respond_unauthorized("Token holder no longer exists.".to_owned()))
        },
        Err(e) => {
            log::error!("Error looking up token holder {:?}: {}", &claims.sub, &e);
            Err(text_500(None))
        },
    }
}

/**
Middleware function that requires a valid bearer token, and hands its
`Claims` on to the handler as a request extension.
*/
pub async fn jwt_authenticate<B>(
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob = match req.extensions().get::<Arc<Glob>>() {
        Some(glob) => glob.clone(),
        None => {
            log::error!("jwt_authenticate() can't find the Glob extension.");
            return text_500(None);
        },
    };

    let token = match req.headers().get(header::AUTHORIZATION) {
        Some(val) => match val.to_str() {
            Ok(s) => match s.strip_prefix("Bearer ") {
                Some(token) => token.trim().to_owned(),
                None => {
                    return respond_unauthorized(
                        "Authorization header must hold a Bearer token.".to_owned()
                    );
                },
            },
            Err(e) => {
                log::trace!("Failed converting Authorization value {:?} to &str: {}", val, &e);
                return respond_unauthorized(
                    "Authorization header value unrecognizable.".to_owned()
                );
            },
        },
        None => {
            return respond_unauthorized(
                "Request must have an Authorization header.".to_owned()
            );
        },
    };

    match current_claims(&glob, &token).await {
        Ok(claims) => {
            log::trace!("Request from {:?} ({}).", &claims.sub, &claims.role);
            req.extensions_mut().insert(claims);
        },
        Err(resp) => { return resp; },
    }

    next.run(req).await
}

/// Data type to read the body of a login request.
#[derive(Deserialize, Debug)]
pub struct LoginData {
    pub uname: String,
    pub password: String,
}

pub async fn login(
    Extension(glob): Extension<Arc<Glob>>,
    body: Option<String>,
) -> Response {
    let form: LoginData = match parse_body(body) {
        Ok(form) => form,
        Err(resp) => { return resp; },
    };
    log::trace!("login( {:?} ) called.", &form.uname);

    match auth::authenticate(&glob.store, &glob.issuer, &form.uname, &form.password).await {
        Ok(AuthResult::Token { token, user }) => (
            StatusCode::OK,
            Json(json!({
                "token": token,
                "uname": user.uname(),
                "role": user.role(),
            })),
        ).into_response(),
        Ok(AuthResult::BadPassword) | Ok(AuthResult::NoSuchUser) => {
            respond_unauthorized("Invalid username/password combination.".to_owned())
        },
        Ok(x) => {
            log::warn!(
                "auth::authenticate( {:?}, [ password ] ) returned {:?}, which shouldn't ever happen.",
                &form.uname, &x
            );
            text_500(None)
        },
        Err(e) => {
            log::error!("auth::authenticate( {:?}, [ password ] ): {}", &form.uname, &e);
            text_500(None)
        },
    }
}

/// Data type to read the body of a signup request.
#[derive(Deserialize, Debug)]
pub struct SignupData {
    pub name: String,
    pub uname: String,
    pub password: String,
    pub role: Option<String>,
}

pub async fn signup(
    Extension(glob): Extension<Arc<Glob>>,
    body: Option<String>,
) -> Response {
    let form: SignupData = match parse_body(body) {
        Ok(form) => form,
        Err(resp) => { return resp; },
    };
    log::trace!("signup( {:?}, {:?} ) called.", &form.uname, &form.role);

    let role: Role = match &form.role {
        None => Role::Student,
        Some(s) => match s.parse() {
            Ok(role) => role,
            Err(e) => { return respond_bad_request(e); },
        },
    };

    match glob.store.register(&form.name, &form.uname, &form.password, role).await {
        Ok(u) => {
            log::info!("New {} {:?} signed up.", &role, u.uname());
            (StatusCode::CREATED, Json(u)).into_response()
        },
        Err(e) => {
            let code = status_for(&e);
            if code == StatusCode::INTERNAL_SERVER_ERROR {
                log::error!("Error registering {:?}: {}", &form.uname, &e);
                text_500(None)
            } else {
                (code, e.to_string()).into_response()
            }
        },
    }
}

/// Reads the requested `Action` from the request headers.
fn requested_action(headers: &HeaderMap) -> Result<Action, Response> {
    match headers.get(ACTION_HEADER) {
        Some(act) => match act.to_str() {
            Ok(s) => s.parse().map_err(respond_bad_request),
            Err(_) => Err(respond_bad_request(
                "x-registrar-action header unrecognizable.".to_owned()
            )),
        },
        None => Err(respond_bad_request(
            "Request must have an x-registrar-action header.".to_owned()
        )),
    }
}

pub async fn api(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    Extension(claims): Extension<Claims>,
    body: Option<String>,
) -> Response {
    let action = match requested_action(&headers) {
        Ok(action) => action,
        Err(resp) => { return resp; },
    };
    log::trace!("api( {} ) called by {:?} ({}).", &action, &claims.sub, &claims.role);

    if !permits(claims.role, action) {
        log::info!("{:?} ({}) attempted forbidden action {}.", &claims.sub, &claims.role, &action);
        return respond_forbidden(action, format!(
            "A {} may not perform {}.", &claims.role, &action
        ));
    }

    let glob = glob.as_ref();
    let res = match action {
        Action::ListStudents   => student::list(glob).await,
        Action::GetStudent     => student::get(glob, body).await,
        Action::AddStudent     => student::add(glob, body).await,
        Action::UpdateStudent  => student::update(glob, body).await,
        Action::DeleteStudent  => student::delete(glob, body).await,
        Action::UploadStudents => student::upload(glob, body).await,

        Action::ListTeachers   => teacher::list(glob).await,
        Action::GetTeacher     => teacher::get(glob, body).await,
        Action::AddTeacher     => teacher::add(glob, body).await,
        Action::UpdateTeacher  => teacher::update(glob, body).await,
        Action::DeleteTeacher  => teacher::delete(glob, body).await,

        Action::ListManagers   => manager::list(glob).await,
        Action::GetManager     => manager::get(glob, body).await,
        Action::AddManager     => manager::add(glob, body).await,
        Action::UpdateManager  => manager::update(glob, body).await,
        Action::DeleteManager  => manager::delete(glob, body).await,
        Action::Subordinates   => manager::subordinates(glob, body).await,

        Action::ListSubjects   => subject::list(glob).await,
        Action::AddSubject     => subject::add(glob, body).await,
        Action::DeleteSubject  => subject::delete(glob, body).await,
        Action::UploadSubjects => subject::upload(glob, body).await,

        Action::Enroll          => records::enroll(glob, &claims, body).await,
        Action::ListEnrollments => records::list_enrollments(glob, &claims, body).await,
        Action::ApprovePayment  => records::approve_payment(glob, body).await,
        Action::RecordExam      => records::record_exam(glob, &claims, body).await,
        Action::ListAttempts    => records::list_attempts(glob, &claims, body).await,
        Action::CanAdvance      => records::can_advance(glob, &claims, body).await,
        Action::Promote         => records::promote(glob, body).await,
    };

    match res {
        Ok(resp) => resp,
        Err(resp) => resp,
    }
}

/// All the routes, wired to the handlers above and sharing `glob`.
pub fn router(glob: Arc<Glob>) -> Router {
    Router::new()
        .route("/api", post(api).layer(middleware::from_fn(jwt_authenticate)))
        .route("/login", post(login))
        .route("/signup", post(signup))
        .layer(middleware::from_fn(request_identity))
        .layer(Extension(glob))
}
