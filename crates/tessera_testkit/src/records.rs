//! Record types used across tests.
//!
//! Each covers one identity style: [`Employee`] declares its identity,
//! [`Number`] and [`Company`] rely on the `id` convention and [`Note`]
//! has none, so the collection generates one.

use bytes::Bytes;
use tessera_core::{CoreResult, FieldReader, FieldWriter, Frozen, Mappable};

/// A postal address, stored nested inside [`Employee`].
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City.
    pub city: String,
    /// Postal code, when known.
    pub zip: Option<u32>,
}

impl Mappable for Address {
    fn fields() -> &'static [&'static str] {
        &["street", "city", "zip"]
    }

    fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
        out.put("street", &self.street)?;
        out.put("city", &self.city)?;
        out.put("zip", &self.zip)
    }

    fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            street: input.required("street")?,
            city: input.required("city")?,
            zip: input.optional("zip")?,
        })
    }
}

/// An employee identified by `emp_id`, which cannot change once set.
#[derive(Debug, Clone, PartialEq)]
pub struct Employee {
    /// Identity.
    pub emp_id: Frozen<i64>,
    /// Full name.
    pub name: String,
    /// Hire date as milliseconds since the Unix epoch.
    pub join_date: i64,
    /// Home address.
    pub address: Address,
    /// Monthly salary.
    pub salary: f64,
    /// Badge photo.
    pub photo: Bytes,
    /// Skill tags.
    pub skills: Vec<String>,
    /// `emp_id` of the manager.
    pub manager: Option<i64>,
}

impl Employee {
    /// Creates an employee whose other fields derive from `emp_id`.
    pub fn sample(emp_id: i64) -> Self {
        Self {
            emp_id: Frozen::new(emp_id),
            name: format!("Employee {emp_id}"),
            join_date: 1_600_000_000_000 + emp_id * 86_400_000,
            address: Address {
                street: format!("{emp_id} Main Street"),
                city: if emp_id % 2 == 0 { "Oslo" } else { "Bergen" }.to_string(),
                zip: u32::try_from(emp_id).ok().map(|n| 1000 + n),
            },
            salary: 1000.0 + emp_id as f64 * 10.5,
            photo: Bytes::from(vec![emp_id as u8; 16]),
            skills: vec!["rust".to_string(), format!("skill-{emp_id}")],
            manager: (emp_id > 1).then_some(1),
        }
    }
}

impl Mappable for Employee {
    fn fields() -> &'static [&'static str] {
        &[
            "emp_id",
            "name",
            "join_date",
            "address",
            "salary",
            "photo",
            "skills",
            "manager",
        ]
    }

    fn id_field() -> Option<&'static str> {
        Some("emp_id")
    }

    fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
        out.put("emp_id", self.emp_id.get())?;
        out.put("name", &self.name)?;
        out.put("join_date", &self.join_date)?;
        out.put_nested("address", &self.address)?;
        out.put("salary", &self.salary)?;
        out.put("photo", &self.photo)?;
        out.put("skills", &self.skills)?;
        out.put("manager", &self.manager)
    }

    fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
        let mut employee = Self {
            emp_id: Frozen::default(),
            name: input.required("name")?,
            join_date: input.required("join_date")?,
            address: input.nested("address")?,
            salary: input.required("salary")?,
            photo: input.required("photo")?,
            skills: input.required("skills")?,
            manager: input.optional("manager")?,
        };
        input.restore("emp_id", &mut employee.emp_id)?;
        Ok(employee)
    }
}

/// A number and its square, identified by the `id` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Number {
    /// Identity.
    pub id: i64,
    /// `id * id`.
    pub square: i64,
}

impl Number {
    /// Creates the record for `id`.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            square: id * id,
        }
    }
}

impl Mappable for Number {
    fn fields() -> &'static [&'static str] {
        &["id", "square"]
    }

    fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
        out.put("id", &self.id)?;
        out.put("square", &self.square)
    }

    fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            id: input.required("id")?,
            square: input.required("square")?,
        })
    }
}

/// A company with a text identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Company {
    /// Registration code, the identity.
    pub id: String,
    /// Trading name.
    pub name: String,
    /// Head count.
    pub staff: u32,
}

impl Mappable for Company {
    fn fields() -> &'static [&'static str] {
        &["id", "name", "staff"]
    }

    fn collection_name() -> &'static str {
        "companies"
    }

    fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
        out.put("id", &self.id)?;
        out.put("name", &self.name)?;
        out.put("staff", &self.staff)
    }

    fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            id: input.required("id")?,
            name: input.required("name")?,
            staff: input.required("staff")?,
        })
    }
}

/// A free-text note without an identity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Body.
    pub text: String,
}

impl Mappable for Note {
    fn fields() -> &'static [&'static str] {
        &["text"]
    }

    fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
        out.put("text", &self.text)
    }

    fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            text: input.required("text")?,
        })
    }
}
