/*!
Handlers for the subject catalog.
*/
use axum::{http::StatusCode, response::Response};
use serde_json::json;

use crate::{
    config::Glob,
    perm::Action,
    subject::NewSubject,
    workflow::Error,
};
use super::*;

pub async fn list(glob: &Glob) -> Result<Response, Response> {
    log::trace!("subject::list( [ glob ] ) called.");

    let subjects = glob.store.get_subjects().await
        .map_err(|e| respond_error(Action::ListSubjects, &Error::from(e)))?;
    Ok(respond_json(StatusCode::OK, Action::ListSubjects, &subjects))
}

pub async fn add(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let ns: NewSubject = parse_body(body)?;
    log::trace!("subject::add( [ glob ], {:?} ) called.", &ns);

    let s = glob.store.insert_subject(&ns).await
        .map_err(|e| respond_error(Action::AddSubject, &e))?;
    Ok(respond_json(StatusCode::CREATED, Action::AddSubject, &s))
}

pub async fn delete(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("subject::delete( [ glob ], {} ) called.", &id);

    glob.store.delete_subject(id).await
        .map_err(|e| respond_error(Action::DeleteSubject, &e))?;
    Ok(respond_json(StatusCode::OK, Action::DeleteSubject, &json!({ "deleted": id })))
}

pub async fn upload(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    log::trace!("subject::upload( [ glob ], ... ) called.");

    let csv_text = match body {
        Some(text) => text,
        None => {
            return Err(respond_bad_request(
                "Request requires a CSV body with subject information.".to_owned()
            ));
        },
    };
    let subjects = NewSubject::vec_from_csv_reader(csv_text.as_bytes())
        .map_err(respond_bad_request)?;

    let n = glob.store.insert_subjects(&subjects).await
        .map_err(|e| respond_error(Action::UploadSubjects, &e))?;
    log::info!("Uploaded {} subjects.", &n);
    Ok(respond_json(StatusCode::CREATED, Action::UploadSubjects, &json!({ "inserted": n })))
}
