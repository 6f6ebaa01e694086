#![allow(dead_code)]

use mongo_adapter::bson::{Bson, Document};
use mongo_adapter::{Collection, FieldMatch, RecordKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foo {
    pub foo: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FooPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foo: Option<String>,
}

pub enum FooKey {
    Foo(String),
}

impl RecordKey for FooKey {
    fn field(&self) -> &str {
        match self {
            FooKey::Foo(_) => "foo",
        }
    }

    fn value(&self) -> Bson {
        match self {
            FooKey::Foo(value) => Bson::String(value.clone()),
        }
    }
}

pub struct FooCollection;

impl Collection for FooCollection {
    const NAME: &'static str = "fooCollection";
    type Record = Foo;
    type Patch = FooPatch;
    type Key = FooKey;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub age: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
}

pub enum UserKey {
    Id(i64),
    Email(String),
}

impl RecordKey for UserKey {
    fn field(&self) -> &str {
        match self {
            UserKey::Id(_) => "id",
            UserKey::Email(_) => "email",
        }
    }

    fn value(&self) -> Bson {
        match self {
            UserKey::Id(id) => Bson::Int64(*id),
            UserKey::Email(email) => Bson::String(email.clone()),
        }
    }
}

pub struct Users;

impl Collection for Users {
    const NAME: &'static str = "users";
    type Record = User;
    type Patch = UserPatch;
    type Key = UserKey;
}

/// Schema-less collection of plain documents
pub struct Events;

impl Collection for Events {
    const NAME: &'static str = "events";
    type Record = Document;
    type Patch = Document;
    type Key = FieldMatch;
}

pub fn foo(value: &str) -> Foo {
    Foo {
        foo: value.to_string(),
    }
}

pub fn user(id: i64, name: &str, age: i32) -> User {
    User {
        id,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        age,
    }
}
