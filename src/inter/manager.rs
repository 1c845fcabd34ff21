/*!
Handlers for maintaining managers and the reporting hierarchy.
*/
use axum::{http::StatusCode, response::Response};
use serde_json::json;

use crate::{
    config::Glob,
    perm::Action,
    user::{ManagerUpdate, NewManager, Role, User},
    workflow::{Entity, Error},
};
use super::*;

pub async fn list(glob: &Glob) -> Result<Response, Response> {
    log::trace!("manager::list( [ glob ] ) called.");

    let managers = glob.store.get_users_by_role(Role::Manager).await
        .map_err(|e| respond_error(Action::ListManagers, &Error::from(e)))?;
    Ok(respond_json(StatusCode::OK, Action::ListManagers, &managers))
}

pub async fn get(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("manager::get( [ glob ], {} ) called.", &id);

    match glob.store.get_user(id).await {
        Ok(Some(u @ User::Manager(_))) => Ok(respond_json(StatusCode::OK, Action::GetManager, &u)),
        Ok(_) => Err(respond_error(Action::GetManager, &Error::NotFound(Entity::Manager, id))),
        Err(e) => Err(respond_error(Action::GetManager, &Error::from(e))),
    }
}

pub async fn add(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let nm: NewManager = parse_body(body)?;
    log::trace!("manager::add( [ glob ], {:?} ) called.", &nm.uname);

    let u = glob.store.insert_manager(&nm).await
        .map_err(|e| respond_error(Action::AddManager, &e))?;
    Ok(respond_json(StatusCode::CREATED, Action::AddManager, &u))
}

pub async fn update(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let upd: ManagerUpdate = parse_body(body)?;
    log::trace!("manager::update( [ glob ], {:?} ) called.", &upd.id);

    let u = glob.store.update_manager(&upd).await
        .map_err(|e| respond_error(Action::UpdateManager, &e))?;
    Ok(respond_json(StatusCode::OK, Action::UpdateManager, &u))
}

pub async fn delete(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("manager::delete( [ glob ], {} ) called.", &id);

    glob.store.delete_manager(id).await
        .map_err(|e| respond_error(Action::DeleteManager, &e))?;
    Ok(respond_json(StatusCode::OK, Action::DeleteManager, &json!({ "deleted": id })))
}

pub async fn subordinates(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("manager::subordinates( [ glob ], {} ) called.", &id);

    let reports = glob.store.subordinates(id).await
        .map_err(|e| respond_error(Action::Subordinates, &e))?;
    Ok(respond_json(StatusCode::OK, Action::Subordinates, &reports))
}
