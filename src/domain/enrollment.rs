use {
    super::id::{CourseId, UserId},
    serde::{Deserialize, Serialize},
};

/// Pushes `item` unless it is already present. Returns whether it was added.
///
/// Enrollment lists are appended from webhook redeliveries, so a plain push
/// would duplicate entries on every retry.
pub fn append_once<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    if items.contains(&item) {
        return false;
    }
    items.push(item);
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub image_url: String,
    pub enrolled_courses: Vec<CourseId>,
    #[serde(default)]
    pub version: u64,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: name.into(),
            image_url: String::new(),
            enrolled_courses: Vec::new(),
            version: 0,
        }
    }

    pub fn enroll(&mut self, course: &CourseId) -> bool {
        append_once(&mut self.enrolled_courses, course.clone())
    }

    pub fn is_enrolled_in(&self, course: &CourseId) -> bool {
        self.enrolled_courses.contains(course)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub enrolled_students: Vec<UserId>,
    #[serde(default)]
    pub version: u64,
}

impl Course {
    pub fn new(id: CourseId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            enrolled_students: Vec::new(),
            version: 0,
        }
    }

    pub fn enroll(&mut self, student: &UserId) -> bool {
        append_once(&mut self.enrolled_students, student.clone())
    }

    pub fn has_student(&self, student: &UserId) -> bool {
        self.enrolled_students.contains(student)
    }
}
