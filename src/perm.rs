/*!
Who may do what.

Every `/api` request names an `Action`; `permits()` is the single place
that decides whether the caller's `Role` may perform it.
*/
use crate::user::Role;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    ListStudents,
    GetStudent,
    AddStudent,
    UpdateStudent,
    DeleteStudent,
    UploadStudents,
    ListTeachers,
    GetTeacher,
    AddTeacher,
    UpdateTeacher,
    DeleteTeacher,
    ListManagers,
    GetManager,
    AddManager,
    UpdateManager,
    DeleteManager,
    Subordinates,
    ListSubjects,
    AddSubject,
    DeleteSubject,
    UploadSubjects,
    Enroll,
    ListEnrollments,
    ApprovePayment,
    RecordExam,
    ListAttempts,
    CanAdvance,
    Promote,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::ListStudents, Action::GetStudent, Action::AddStudent,
        Action::UpdateStudent, Action::DeleteStudent, Action::UploadStudents,
        Action::ListTeachers, Action::GetTeacher, Action::AddTeacher,
        Action::UpdateTeacher, Action::DeleteTeacher,
        Action::ListManagers, Action::GetManager, Action::AddManager,
        Action::UpdateManager, Action::DeleteManager, Action::Subordinates,
        Action::ListSubjects, Action::AddSubject, Action::DeleteSubject,
        Action::UploadSubjects,
        Action::Enroll, Action::ListEnrollments, Action::ApprovePayment,
        Action::RecordExam, Action::ListAttempts, Action::CanAdvance,
        Action::Promote,
    ];

    /// The value of the `x-registrar-action` header naming this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ListStudents    => "list-students",
            Action::GetStudent      => "get-student",
            Action::AddStudent      => "add-student",
            Action::UpdateStudent   => "update-student",
            Action::DeleteStudent   => "delete-student",
            Action::UploadStudents  => "upload-students",
            Action::ListTeachers    => "list-teachers",
            Action::GetTeacher      => "get-teacher",
            Action::AddTeacher      => "add-teacher",
            Action::UpdateTeacher   => "update-teacher",
            Action::DeleteTeacher   => "delete-teacher",
            Action::ListManagers    => "list-managers",
            Action::GetManager      => "get-manager",
            Action::AddManager      => "add-manager",
            Action::UpdateManager   => "update-manager",
            Action::DeleteManager   => "delete-manager",
            Action::Subordinates    => "subordinates",
            Action::ListSubjects    => "list-subjects",
            Action::AddSubject      => "add-subject",
            Action::DeleteSubject   => "delete-subject",
            Action::UploadSubjects  => "upload-subjects",
            Action::Enroll          => "enroll",
            Action::ListEnrollments => "list-enrollments",
            Action::ApprovePayment  => "approve-payment",
            Action::RecordExam      => "record-exam",
            Action::ListAttempts    => "list-attempts",
            Action::CanAdvance      => "can-advance",
            Action::Promote         => "promote",
        }
    }

    /// Read-only views of the people and the catalog, open to everyone.
    pub fn is_directory_view(&self) -> bool {
        matches!(self,
            Action::ListStudents | Action::GetStudent |
            Action::ListTeachers | Action::GetTeacher |
            Action::ListManagers | Action::GetManager |
            Action::Subordinates | Action::ListSubjects
        )
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Action::ALL.iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("{:?} is not a recognized action.", s))
    }
}

/**
Whether a user with `role` may perform `action` at all.

Students additionally may only act on their own records; that depends on
the request body and is checked by the handlers.
*/
pub fn permits(role: Role, action: Action) -> bool {
    use Action::*;

    if action.is_directory_view() {
        return true;
    }

    match role {
        Role::Student => matches!(action,
            Enroll | ListEnrollments | ListAttempts | CanAdvance
        ),
        Role::Teacher => matches!(action,
            ListEnrollments | RecordExam | ListAttempts | CanAdvance | Promote
        ),
        Role::Manager => manager_permits(action),
        Role::SuperManager => manager_permits(action) || matches!(action,
            AddManager | UpdateManager | DeleteManager
        ),
    }
}

fn manager_permits(action: Action) -> bool {
    use Action::*;

    matches!(action,
        AddStudent | UpdateStudent | DeleteStudent | UploadStudents |
        AddTeacher | UpdateTeacher | DeleteTeacher |
        AddSubject | DeleteSubject | UploadSubjects |
        Enroll | ListEnrollments | ApprovePayment |
        ListAttempts | CanAdvance | Promote
    )
}
