//! Contacts service

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::{Page, PageRequest, ServiceError, NOT_ALLOWED};
use crate::{
    database::Db,
    domain::aggregates::{ensure_contact_capacity, Actor, Contact, ContactData, ContactError},
    repositories::PgContactsRepository,
};

#[derive(Debug, Clone)]
pub struct PgContactsService {
    db: Db,
    contacts: PgContactsRepository,
}

impl PgContactsService {
    #[must_use]
    pub fn new(db: Db) -> Self { Self { db, contacts: PgContactsRepository::new() } }
}

#[async_trait]
impl ContactsService for PgContactsService {
    async fn list_contacts(
        &self,
        actor: Actor,
        owner: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Contact>, ServiceError> {
        let owner = visible_owner(actor, owner)?;

        let mut tx = self.db.begin().await?;
        let items = self.contacts.list(&mut tx, owner, page.limit, page.offset).await?;
        let total = if page.is_paginated() { Some(self.contacts.count(&mut tx, owner).await?) } else { None };
        tx.commit().await?;
        Ok(Page { items, total })
    }

    async fn get_contact(&self, actor: Actor, id: i64) -> Result<Contact, ServiceError> {
        let mut tx = self.db.begin().await?;
        let contact = self.contacts.find(&mut tx, id).await?;
        tx.commit().await?;
        owned(actor, contact)
    }

    async fn create_contact(
        &self,
        actor: Actor,
        user_id: Option<i64>,
        data: ContactData,
    ) -> Result<Contact, ServiceError> {
        let user_id = match user_id {
            Some(user_id) if user_id != actor.id && !actor.is_admin() => {
                return Err(ServiceError::Forbidden(NOT_ALLOWED.to_string()));
            }
            Some(user_id) => user_id,
            None => actor.id,
        };
        check_contact(&data)?;

        let mut tx = self.db.begin().await?;
        ensure_contact_capacity(self.contacts.count(&mut tx, Some(user_id)).await?)?;
        let contact = self.contacts.create(&mut tx, user_id, &data).await?;
        tx.commit().await?;

        tracing::info!(contact_id = contact.id, user_id, "contact created");
        Ok(contact)
    }

    async fn update_contact(&self, actor: Actor, id: i64, data: ContactData) -> Result<Contact, ServiceError> {
        check_contact(&data)?;

        let mut tx = self.db.begin().await?;
        owned(actor, self.contacts.find(&mut tx, id).await?)?;
        let contact = self.contacts.update(&mut tx, id, &data).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(contact)
    }

    async fn delete_contact(&self, actor: Actor, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        owned(actor, self.contacts.find(&mut tx, id).await?)?;
        self.contacts.delete(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// The owner filter an actor may list with: admins see everyone, other users only themselves.
fn visible_owner(actor: Actor, requested: Option<i64>) -> Result<Option<i64>, ServiceError> {
    match requested {
        _ if actor.is_admin() => Ok(requested),
        Some(owner) if owner != actor.id => Err(ServiceError::Forbidden(NOT_ALLOWED.to_string())),
        _ => Ok(Some(actor.id)),
    }
}

/// Other users' contacts are reported as missing to non-admins.
fn owned(actor: Actor, contact: Option<Contact>) -> Result<Contact, ServiceError> {
    contact.filter(|contact| actor.is_admin() || contact.user_id == actor.id).ok_or(ServiceError::NotFound)
}

fn check_contact(data: &ContactData) -> Result<(), ServiceError> {
    data.validate().map_err(|e| match e {
        ContactError::Phone(e) => ServiceError::field("phone", e.to_string()),
        other => ServiceError::Contact(other),
    })
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContactsService: Send + Sync {
    /// Contacts visible to `actor`, optionally narrowed to one user.
    async fn list_contacts(
        &self,
        actor: Actor,
        owner: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Contact>, ServiceError>;

    async fn get_contact(&self, actor: Actor, id: i64) -> Result<Contact, ServiceError>;

    /// Adds a contact for `user_id`, or for the actor when not given.
    async fn create_contact(
        &self,
        actor: Actor,
        user_id: Option<i64>,
        data: ContactData,
    ) -> Result<Contact, ServiceError>;

    async fn update_contact(&self, actor: Actor, id: i64, data: ContactData) -> Result<Contact, ServiceError>;

    async fn delete_contact(&self, actor: Actor, id: i64) -> Result<(), ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::UserRole;

    const CUSTOMER: Actor = Actor { id: 1, role: UserRole::Customer };
    const ADMIN: Actor = Actor { id: 9, role: UserRole::Admin };

    fn contact(user_id: i64) -> Contact {
        Contact {
            id: 5,
            user_id,
            city: "Москва".into(),
            street: "Тверская".into(),
            house: "1".into(),
            structure: String::new(),
            building: String::new(),
            apartment: "12".into(),
            phone: "+79991234567".into(),
        }
    }

    #[test]
    fn customers_only_list_their_own() {
        assert_eq!(visible_owner(CUSTOMER, None).unwrap(), Some(1));
        assert_eq!(visible_owner(CUSTOMER, Some(1)).unwrap(), Some(1));
        assert!(matches!(visible_owner(CUSTOMER, Some(2)), Err(ServiceError::Forbidden(m)) if m == NOT_ALLOWED));
        assert_eq!(visible_owner(ADMIN, None).unwrap(), None);
        assert_eq!(visible_owner(ADMIN, Some(2)).unwrap(), Some(2));
    }

    #[test]
    fn foreign_contact_looks_missing() {
        assert!(owned(CUSTOMER, Some(contact(1))).is_ok());
        assert!(matches!(owned(CUSTOMER, Some(contact(2))), Err(ServiceError::NotFound)));
        assert!(owned(ADMIN, Some(contact(2))).is_ok());
        assert!(matches!(owned(ADMIN, None), Err(ServiceError::NotFound)));
    }

    #[test]
    fn bad_phone_is_a_field_error() {
        let data = ContactData { phone: "phone".into(), ..Default::default() };
        let Err(ServiceError::Validation(errors)) = check_contact(&data) else {
            panic!("expected a validation error");
        };
        assert!(errors.get("phone").is_some());
    }
}
