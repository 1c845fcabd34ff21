/*!
Handlers for maintaining the student roster.
*/
use axum::{http::StatusCode, response::Response};
use serde_json::json;

use crate::{
    config::Glob,
    perm::Action,
    user::{NewStudent, Role, StudentUpdate, User},
    workflow::{Entity, Error},
};
use super::*;

pub async fn list(glob: &Glob) -> Result<Response, Response> {
    log::trace!("student::list( [ glob ] ) called.");

    let studs = glob.store.get_users_by_role(Role::Student).await
        .map_err(|e| respond_error(Action::ListStudents, &Error::from(e)))?;
    Ok(respond_json(StatusCode::OK, Action::ListStudents, &studs))
}

pub async fn get(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("student::get( [ glob ], {} ) called.", &id);

    match glob.store.get_user(id).await {
        Ok(Some(u @ User::Student(_))) => Ok(respond_json(StatusCode::OK, Action::GetStudent, &u)),
        Ok(_) => Err(respond_error(Action::GetStudent, &Error::NotFound(Entity::Student, id))),
        Err(e) => Err(respond_error(Action::GetStudent, &Error::from(e))),
    }
}

pub async fn add(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let ns: NewStudent = parse_body(body)?;
    log::trace!("student::add( [ glob ], {:?} ) called.", &ns.uname);

    let u = glob.store.insert_student(&ns).await
        .map_err(|e| respond_error(Action::AddStudent, &e))?;
    Ok(respond_json(StatusCode::CREATED, Action::AddStudent, &u))
}

pub async fn update(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let upd: StudentUpdate = parse_body(body)?;
    log::trace!("student::update( [ glob ], {:?} ) called.", &upd);

    let u = glob.store.update_student(&upd).await
        .map_err(|e| respond_error(Action::UpdateStudent, &e))?;
    Ok(respond_json(StatusCode::OK, Action::UpdateStudent, &u))
}

pub async fn delete(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("student::delete( [ glob ], {} ) called.", &id);

    glob.store.delete_student(id).await
        .map_err(|e| respond_error(Action::DeleteStudent, &e))?;
    Ok(respond_json(StatusCode::OK, Action::DeleteStudent, &json!({ "deleted": id })))
}

/// The body is the CSV text itself, not JSON.
pub async fn upload(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    log::trace!("student::upload( [ glob ], ... ) called.");

    let csv_text = match body {
        Some(text) => text,
        None => {
            return Err(respond_bad_request(
                "Request requires a CSV body with student information.".to_owned()
            ));
        },
    };
    let studs = NewStudent::vec_from_csv_reader(csv_text.as_bytes())
        .map_err(respond_bad_request)?;

    let n = glob.store.insert_students(&studs).await
        .map_err(|e| respond_error(Action::UploadStudents, &e))?;
    log::info!("Uploaded {} students.", &n);
    Ok(respond_json(StatusCode::CREATED, Action::UploadStudents, &json!({ "inserted": n })))
}
