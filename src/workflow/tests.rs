use float_cmp::approx_eq;

use super::*;
use crate::ledger::mem::{tx, MemStore};
use crate::tests::ensure_logging;
use crate::{MAX_ENROLLMENTS, MAX_LEVEL};

static SUBJECT_NAMES: &[&str] = &[
    "Math", "English", "History", "Biology", "Chemistry", "Art", "Music", "Latin",
];

#[tokio::test]
async fn enroll_creates_pending_enrollment() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);

    let e = tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();
    assert_eq!((e.student_id, e.subject_id), (stud, math));
    assert!(!e.payment_approved);
    assert!(!e.exam_passed);
    assert_eq!(mem.enrollments(), vec![e]);
}

#[tokio::test]
async fn enroll_missing_referents() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);

    match tx!(mem, |l| enroll(&mut l, 999, math).await) {
        Err(Error::NotFound(Entity::Student, 999)) => {},
        x => panic!("unexpected {:?}", &x),
    }
    match tx!(mem, |l| enroll(&mut l, stud, 998).await) {
        Err(Error::NotFound(Entity::Subject, 998)) => {},
        x => panic!("unexpected {:?}", &x),
    }
    assert!(mem.enrollments().is_empty());
}

#[tokio::test]
async fn duplicate_enrollment_rejected() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);

    tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();
    match tx!(mem, |l| enroll(&mut l, stud, math).await) {
        Err(Error::DuplicateEnrollment { student_id, subject_id }) => {
            assert_eq!((student_id, subject_id), (stud, math));
        },
        x => panic!("unexpected {:?}", &x),
    }
    assert_eq!(mem.enrollments().len(), 1);
}

#[tokio::test]
async fn enrollment_capacity() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let subjects: Vec<i64> = SUBJECT_NAMES.iter()
        .map(|name| mem.add_subject(name, 1))
        .collect();

    for (n, subj) in subjects[..MAX_ENROLLMENTS].iter().enumerate() {
        let res = tx!(mem, |l| enroll(&mut l, stud, *subj).await);
        assert!(res.is_ok(), "enrollment {} failed: {:?}", n + 1, &res);
    }

    match tx!(mem, |l| enroll(&mut l, stud, subjects[MAX_ENROLLMENTS]).await) {
        Err(Error::CapacityExceeded { held, .. }) => { assert_eq!(held, MAX_ENROLLMENTS); },
        x => panic!("unexpected {:?}", &x),
    }
    // A full student is over capacity even for a subject they already hold.
    match tx!(mem, |l| enroll(&mut l, stud, subjects[0]).await) {
        Err(Error::CapacityExceeded { .. }) => {},
        x => panic!("unexpected {:?}", &x),
    }
    assert_eq!(mem.enrollments().len(), MAX_ENROLLMENTS);
}

#[tokio::test]
async fn approve_payment_is_idempotent() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);
    let e = tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();

    let a = tx!(mem, |l| approve_payment(&mut l, e.id).await).unwrap();
    assert!(a.payment_approved);
    let b = tx!(mem, |l| approve_payment(&mut l, e.id).await).unwrap();
    assert_eq!(a, b);

    match tx!(mem, |l| approve_payment(&mut l, e.id + 100).await) {
        Err(Error::NotFound(Entity::Enrollment, _)) => {},
        x => panic!("unexpected {:?}", &x),
    }
}

#[tokio::test]
async fn enrollments_for_student() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let other = mem.add_student("mjones", 1);
    let math = mem.add_subject("Math", 1);
    let eng = mem.add_subject("English", 1);
    tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();
    tx!(mem, |l| enroll(&mut l, stud, eng).await).unwrap();
    tx!(mem, |l| enroll(&mut l, other, eng).await).unwrap();

    let mut l = mem.begin();
    let held = enrollments_for(&mut l, stud).await.unwrap();
    let subjects: Vec<i64> = held.iter().map(|e| e.subject_id).collect();
    assert_eq!(subjects, vec![math, eng]);
    assert!(matches!(
        enrollments_for(&mut l, 12345).await,
        Err(Error::NotFound(Entity::Student, 12345))
    ));
}

#[tokio::test]
async fn passing_exam_marks_enrollment() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);
    let teach = mem.add_teacher();
    tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();

    let failed = tx!(mem, |l| record_exam(&mut l, stud, math, teach, false, 41.5).await).unwrap();
    assert!(!failed.passed);
    assert!(!mem.enrollments()[0].exam_passed);

    let passed = tx!(mem, |l| record_exam(&mut l, stud, math, teach, true, 88.0).await).unwrap();
    assert!(passed.passed);
    assert!(approx_eq!(f64, passed.score, 88.0));
    assert!(mem.enrollments()[0].exam_passed);

    let mut l = mem.begin();
    let attempts = list_attempts(&mut l, stud, math).await.unwrap();
    assert_eq!(attempts, vec![failed.clone(), passed.clone()]);
    assert!(attempts[0].taken_at <= attempts[1].taken_at);

    // Reading twice gives the same answer.
    assert_eq!(list_attempts(&mut l, stud, math).await.unwrap(), attempts);
}

#[tokio::test]
async fn record_exam_missing_referents() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);
    let teach = mem.add_teacher();

    assert!(matches!(
        tx!(mem, |l| record_exam(&mut l, 999, math, teach, true, 90.0).await),
        Err(Error::NotFound(Entity::Student, 999))
    ));
    assert!(matches!(
        tx!(mem, |l| record_exam(&mut l, stud, 999, teach, true, 90.0).await),
        Err(Error::NotFound(Entity::Subject, 999))
    ));
    assert!(matches!(
        tx!(mem, |l| record_exam(&mut l, stud, math, 999, true, 90.0).await),
        Err(Error::NotFound(Entity::Teacher, 999))
    ));
    assert!(matches!(
        tx!(mem, |l| record_exam(&mut l, stud, math, teach, false, f64::NAN).await),
        Err(Error::Invalid(_))
    ));
    assert!(mem.exams().is_empty());
}

#[tokio::test]
async fn mark_passed_names_missing_pair() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);
    let art = mem.add_subject("Art", 1);
    tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();

    let e = tx!(mem, |l| mark_exam_passed(&mut l, stud, math).await).unwrap();
    assert!(e.exam_passed);

    match tx!(mem, |l| mark_exam_passed(&mut l, stud, art).await) {
        Err(err @ Error::NotEnrolled { .. }) => {
            let msg = err.to_string();
            assert!(msg.contains(&format!("Student {}", stud)), "{}", &msg);
            assert!(msg.contains(&format!("subject {}", art)), "{}", &msg);
            assert!(!msg.contains("id"), "{}", &msg);
        },
        x => panic!("unexpected {:?}", &x),
    }
}

#[tokio::test]
async fn passed_exam_without_enrollment() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);
    let teach = mem.add_teacher();

    match tx!(mem, |l| record_exam(&mut l, stud, math, teach, true, 95.0).await) {
        Err(Error::ConsistencyViolation { student_id, subject_id }) => {
            assert_eq!((student_id, subject_id), (stud, math));
        },
        x => panic!("unexpected {:?}", &x),
    }
    // Rolled back along with everything else.
    assert!(mem.exams().is_empty());

    // A failed attempt needs no enrollment.
    tx!(mem, |l| record_exam(&mut l, stud, math, teach, false, 12.0).await).unwrap();
    assert_eq!(mem.exams().len(), 1);
}

#[tokio::test]
async fn promotion_scenario() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);
    let eng = mem.add_subject("English", 1);
    mem.add_subject("Algebra", 2);
    let teach = mem.add_teacher();

    tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();
    tx!(mem, |l| enroll(&mut l, stud, eng).await).unwrap();
    tx!(mem, |l| record_exam(&mut l, stud, math, teach, true, 75.0).await).unwrap();

    assert!(!tx!(mem, |l| can_advance(&mut l, stud).await).unwrap());
    match tx!(mem, |l| promote(&mut l, stud).await) {
        Err(Error::PromotionDenied { level, missing, .. }) => {
            assert_eq!(level, 1);
            assert_eq!(missing, vec![eng]);
        },
        x => panic!("unexpected {:?}", &x),
    }
    assert_eq!(mem.student(stud).unwrap().level, 1);

    tx!(mem, |l| record_exam(&mut l, stud, eng, teach, true, 64.0).await).unwrap();
    assert!(tx!(mem, |l| can_advance(&mut l, stud).await).unwrap());
    let s = tx!(mem, |l| promote(&mut l, stud).await).unwrap();
    assert_eq!(s.level, 2);
    assert_eq!(mem.student(stud).unwrap().level, 2);

    // Level 2 has Algebra, which hasn't been passed.
    assert!(!tx!(mem, |l| can_advance(&mut l, stud).await).unwrap());
}

#[tokio::test]
async fn gating_is_curriculum_wide() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let math = mem.add_subject("Math", 1);
    mem.add_subject("English", 1);
    let teach = mem.add_teacher();

    tx!(mem, |l| enroll(&mut l, stud, math).await).unwrap();
    tx!(mem, |l| record_exam(&mut l, stud, math, teach, true, 99.0).await).unwrap();

    // Every enrolled subject is passed, but English is still at level 1.
    assert!(!tx!(mem, |l| can_advance(&mut l, stud).await).unwrap());
}

#[tokio::test]
async fn empty_level_advances() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 3);
    mem.add_subject("Math", 1);

    assert!(tx!(mem, |l| can_advance(&mut l, stud).await).unwrap());
    let s = tx!(mem, |l| promote(&mut l, stud).await).unwrap();
    assert_eq!(s.level, 4);
}

#[tokio::test]
async fn max_level_ceiling() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", MAX_LEVEL);
    let calc = mem.add_subject("Calculus", MAX_LEVEL);
    let teach = mem.add_teacher();

    match tx!(mem, |l| promote(&mut l, stud).await) {
        Err(Error::PromotionDenied { .. }) => {},
        x => panic!("unexpected {:?}", &x),
    }

    tx!(mem, |l| enroll(&mut l, stud, calc).await).unwrap();
    tx!(mem, |l| record_exam(&mut l, stud, calc, teach, true, 100.0).await).unwrap();

    for _ in 0..2 {
        match tx!(mem, |l| promote(&mut l, stud).await) {
            Err(Error::MaxLevelReached(id)) => { assert_eq!(id, stud); },
            x => panic!("unexpected {:?}", &x),
        }
        assert_eq!(mem.student(stud).unwrap().level, MAX_LEVEL);
    }
}

#[tokio::test]
async fn level_is_monotone_and_bounded() {
    ensure_logging();
    let mem = MemStore::new();
    let stud = mem.add_student("jsmith", 1);
    let empty_student = mem.add_student("kdoe", 1);
    let teach = mem.add_teacher();
    let per_level: Vec<i64> = (1..=MAX_LEVEL)
        .map(|lvl| mem.add_subject(&format!("Level {} Core", lvl), lvl))
        .collect();

    let mut last = 1;
    for subj in per_level.iter() {
        tx!(mem, |l| enroll(&mut l, stud, *subj).await).unwrap();
        tx!(mem, |l| record_exam(&mut l, stud, *subj, teach, true, 70.0).await).unwrap();
        let _ = tx!(mem, |l| promote(&mut l, stud).await);
        let _ = tx!(mem, |l| promote(&mut l, empty_student).await);

        let level = mem.student(stud).unwrap().level;
        assert!(level >= last);
        assert!((1..=MAX_LEVEL).contains(&level));
        last = level;

        assert_eq!(mem.student(empty_student).unwrap().level, 1);
    }
    assert_eq!(last, MAX_LEVEL);
}

#[tokio::test]
async fn promote_unknown_student() {
    ensure_logging();
    let mem = MemStore::new();
    assert!(matches!(
        tx!(mem, |l| promote(&mut l, 31337).await),
        Err(Error::NotFound(Entity::Student, 31337))
    ));
    assert!(matches!(
        tx!(mem, |l| can_advance(&mut l, 31337).await),
        Err(Error::NotFound(Entity::Student, 31337))
    ));
}
