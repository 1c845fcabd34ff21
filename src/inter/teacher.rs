/*!
Handlers for maintaining the teaching staff.
*/
use axum::{http::StatusCode, response::Response};
use serde_json::json;

use crate::{
    config::Glob,
    perm::Action,
    user::{NewTeacher, Role, TeacherUpdate, User},
    workflow::{Entity, Error},
};
use super::*;

pub async fn list(glob: &Glob) -> Result<Response, Response> {
    log::trace!("teacher::list( [ glob ] ) called.");

    let teachers = glob.store.get_users_by_role(Role::Teacher).await
        .map_err(|e| respond_error(Action::ListTeachers, &Error::from(e)))?;
    Ok(respond_json(StatusCode::OK, Action::ListTeachers, &teachers))
}

pub async fn get(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("teacher::get( [ glob ], {} ) called.", &id);

    match glob.store.get_user(id).await {
        Ok(Some(u @ User::Teacher(_))) => Ok(respond_json(StatusCode::OK, Action::GetTeacher, &u)),
        Ok(_) => Err(respond_error(Action::GetTeacher, &Error::NotFound(Entity::Teacher, id))),
        Err(e) => Err(respond_error(Action::GetTeacher, &Error::from(e))),
    }
}

pub async fn add(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let nt: NewTeacher = parse_body(body)?;
    log::trace!("teacher::add( [ glob ], {:?} ) called.", &nt.uname);

    let u = glob.store.insert_teacher(&nt).await
        .map_err(|e| respond_error(Action::AddTeacher, &e))?;
    Ok(respond_json(StatusCode::CREATED, Action::AddTeacher, &u))
}

pub async fn update(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let upd: TeacherUpdate = parse_body(body)?;
    log::trace!("teacher::update( [ glob ], {:?} ) called.", &upd.id);

    let u = glob.store.update_teacher(&upd).await
        .map_err(|e| respond_error(Action::UpdateTeacher, &e))?;
    Ok(respond_json(StatusCode::OK, Action::UpdateTeacher, &u))
}

/// Exams the teacher recorded stay on the books.
pub async fn delete(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("teacher::delete( [ glob ], {} ) called.", &id);

    glob.store.delete_teacher(id).await
        .map_err(|e| respond_error(Action::DeleteTeacher, &e))?;
    Ok(respond_json(StatusCode::OK, Action::DeleteTeacher, &json!({ "deleted": id })))
}
