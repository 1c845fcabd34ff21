/*!
Handlers for enrollment, exams and promotion.

Students may call the handlers that take a `student_id` only on their own
behalf, and may leave `student_id` out entirely to mean themselves.
*/
use axum::{http::StatusCode, response::Response};
use serde_json::json;

use crate::{
    auth::Claims,
    config::Glob,
    perm::Action,
    user::Role,
};
use super::*;

#[derive(Debug, Deserialize)]
struct StudentRef {
    student_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EnrollData {
    student_id: Option<i64>,
    subject_id: i64,
}

#[derive(Debug, Deserialize)]
struct ExamData {
    student_id: i64,
    subject_id: i64,
    passed: bool,
    score: f64,
}

/// Works out whose records a request is about, holding students to
/// their own.
fn target_student(
    action: Action,
    claims: &Claims,
    student_id: Option<i64>,
) -> Result<i64, Response> {
    match (claims.role, student_id) {
        (Role::Student, None) => Ok(claims.uid),
        (Role::Student, Some(id)) if id == claims.uid => Ok(id),
        (Role::Student, Some(id)) => {
            log::info!("Student {:?} attempted {} on behalf of {}.", &claims.sub, &action, &id);
            Err(respond_forbidden(action, "Students may only act on their own records.".to_owned()))
        },
        (_, Some(id)) => Ok(id),
        (_, None) => Err(respond_bad_request(format!(
            "{} requires a student_id.", &action
        ))),
    }
}

/// Empty bodies are fine here; a student may be asking about their own records.
fn parse_student_ref(body: Option<String>) -> Result<StudentRef, Response> {
    let has_body = body.as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false);

    if has_body {
        parse_body(body)
    } else {
        Ok(StudentRef { student_id: None })
    }
}

pub async fn enroll(
    glob: &Glob,
    claims: &Claims,
    body: Option<String>,
) -> Result<Response, Response> {
    let data: EnrollData = parse_body(body)?;
    log::trace!("records::enroll( [ glob ], {:?}, {:?} ) called.", &claims.sub, &data);

    let student_id = target_student(Action::Enroll, claims, data.student_id)?;
    let e = glob.store.enroll(student_id, data.subject_id).await
        .map_err(|e| respond_error(Action::Enroll, &e))?;
    Ok(respond_json(StatusCode::CREATED, Action::Enroll, &e))
}

pub async fn list_enrollments(
    glob: &Glob,
    claims: &Claims,
    body: Option<String>,
) -> Result<Response, Response> {
    let data = parse_student_ref(body)?;
    log::trace!("records::list_enrollments( [ glob ], {:?}, {:?} ) called.", &claims.sub, &data);

    let student_id = target_student(Action::ListEnrollments, claims, data.student_id)?;
    let held = glob.store.enrollments_for(student_id).await
        .map_err(|e| respond_error(Action::ListEnrollments, &e))?;
    Ok(respond_json(StatusCode::OK, Action::ListEnrollments, &held))
}

pub async fn approve_payment(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let IdData { id } = parse_body(body)?;
    log::trace!("records::approve_payment( [ glob ], {} ) called.", &id);

    let e = glob.store.approve_payment(id).await
        .map_err(|e| respond_error(Action::ApprovePayment, &e))?;
    Ok(respond_json(StatusCode::OK, Action::ApprovePayment, &e))
}

/// The examining teacher is whoever is making the request.
pub async fn record_exam(
    glob: &Glob,
    claims: &Claims,
    body: Option<String>,
) -> Result<Response, Response> {
    let data: ExamData = parse_body(body)?;
    log::trace!("records::record_exam( [ glob ], {:?}, {:?} ) called.", &claims.sub, &data);

    let rec = glob.store.record_exam(
        data.student_id, data.subject_id, claims.uid, data.passed, data.score
    ).await
        .map_err(|e| respond_error(Action::RecordExam, &e))?;
    Ok(respond_json(StatusCode::CREATED, Action::RecordExam, &rec))
}

pub async fn list_attempts(
    glob: &Glob,
    claims: &Claims,
    body: Option<String>,
) -> Result<Response, Response> {
    let data: EnrollData = parse_body(body)?;
    log::trace!("records::list_attempts( [ glob ], {:?}, {:?} ) called.", &claims.sub, &data);

    let student_id = target_student(Action::ListAttempts, claims, data.student_id)?;
    let attempts = glob.store.list_attempts(student_id, data.subject_id).await
        .map_err(|e| respond_error(Action::ListAttempts, &e))?;
    Ok(respond_json(StatusCode::OK, Action::ListAttempts, &attempts))
}

pub async fn can_advance(
    glob: &Glob,
    claims: &Claims,
    body: Option<String>,
) -> Result<Response, Response> {
    let data = parse_student_ref(body)?;
    log::trace!("records::can_advance( [ glob ], {:?}, {:?} ) called.", &claims.sub, &data);

    let student_id = target_student(Action::CanAdvance, claims, data.student_id)?;
    let ok = glob.store.can_advance(student_id).await
        .map_err(|e| respond_error(Action::CanAdvance, &e))?;
    Ok(respond_json(
        StatusCode::OK,
        Action::CanAdvance,
        &json!({ "student_id": student_id, "can_advance": ok })
    ))
}

pub async fn promote(glob: &Glob, body: Option<String>) -> Result<Response, Response> {
    let data: StudentRef = parse_body(body)?;
    log::trace!("records::promote( [ glob ], {:?} ) called.", &data);

    let student_id = match data.student_id {
        Some(id) => id,
        None => {
            return Err(respond_bad_request("promote requires a student_id.".to_owned()));
        },
    };
    let s = glob.store.promote(student_id).await
        .map_err(|e| respond_error(Action::Promote, &e))?;
    Ok(respond_json(StatusCode::OK, Action::Promote, &s))
}
