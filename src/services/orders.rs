//! Orders service
//!
//! Covers the customer's basket, its confirmation and the staff view of all
//! orders. Events raised by the aggregate are queued only after the
//! transaction that produced them commits.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::{Postgres, Transaction};
use std::sync::Arc;

use super::{Page, PageRequest, ServiceError};
use crate::{
    database::Db,
    domain::aggregates::{Actor, BasketLine, Offer, Order, OrderError, OrderStatus},
    repositories::{OrderFilter, PgContactsRepository, PgOrdersRepository, PgProductsRepository, PgShopsRepository},
    tasks::{dispatch_events, TaskQueue},
};

#[derive(Clone)]
pub struct PgOrdersService {
    db: Db,
    queue: Arc<dyn TaskQueue>,
    orders: PgOrdersRepository,
    products: PgProductsRepository,
    contacts: PgContactsRepository,
    shops: PgShopsRepository,
}

impl PgOrdersService {
    #[must_use]
    pub fn new(db: Db, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            db,
            queue,
            orders: PgOrdersRepository::new(),
            products: PgProductsRepository::new(),
            contacts: PgContactsRepository::new(),
            shops: PgShopsRepository::new(),
        }
    }

    async fn offers_for(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        lines: &[BasketLine],
    ) -> Result<Vec<Offer>, ServiceError> {
        let product_ids: Vec<i64> = lines.iter().map(|line| line.product_id).collect();
        let shop_ids: Vec<i64> = lines.iter().map(|line| line.shop_id).collect();
        Ok(self.products.offers(tx, &product_ids, &shop_ids).await?)
    }

    /// Adds `lines` to the user's open basket, opening one if needed.
    async fn fill_basket(&self, user_id: i64, lines: Vec<BasketLine>) -> Result<Order, ServiceError> {
        let mut tx = self.db.begin().await?;
        let mut basket = match self.orders.find_basket(&mut tx, user_id).await? {
            Some(basket) => basket,
            None => self.orders.create(&mut tx, user_id, OrderStatus::New).await?,
        };
        let offers = self.offers_for(&mut tx, &lines).await?;
        basket.add_lines(&lines, &offers)?;
        self.orders.save(&mut tx, &basket).await?;
        let basket = self.orders.find(&mut tx, basket.id()).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;

        tracing::info!(order_id = basket.id(), user_id, lines = lines.len(), "basket updated");
        Ok(basket)
    }

    async fn page(&self, filter: OrderFilter) -> Result<Page<Order>, ServiceError> {
        let mut tx = self.db.begin().await?;
        let items = self.orders.list(&mut tx, filter).await?;
        let total = if filter.limit.is_some() { Some(self.orders.count(&mut tx, filter).await?) } else { None };
        tx.commit().await?;
        Ok(Page { items, total })
    }

    async fn own_order(&self, tx: &mut Transaction<'_, Postgres>, actor: Actor, id: i64) -> Result<Order, ServiceError> {
        self.orders
            .find(tx, id)
            .await?
            .filter(|order| order.user_id() == actor.id)
            .ok_or(ServiceError::NotFound)
    }
}

#[async_trait]
impl OrdersService for PgOrdersService {
    async fn list_basket(&self, actor: Actor, page: PageRequest) -> Result<Page<Order>, ServiceError> {
        self.page(OrderFilter { user_id: Some(actor.id), limit: page.limit, offset: page.offset, ..Default::default() })
            .await
    }

    async fn get_basket(&self, actor: Actor, id: i64) -> Result<Order, ServiceError> {
        let mut tx = self.db.begin().await?;
        let order = self.own_order(&mut tx, actor, id).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn add_to_basket(&self, actor: Actor, lines: Vec<BasketLine>) -> Result<Order, ServiceError> {
        self.fill_basket(actor.id, lines).await
    }

    async fn update_basket(&self, actor: Actor, id: i64, lines: Vec<BasketLine>) -> Result<Order, ServiceError> {
        let mut tx = self.db.begin().await?;
        let mut order = self.own_order(&mut tx, actor, id).await?;
        if order.status() != OrderStatus::New {
            return Err(OrderError::Locked.into());
        }
        let offers = self.offers_for(&mut tx, &lines).await?;
        order.replace_items(&lines, &offers)?;
        self.orders.save(&mut tx, &order).await?;
        let order = self.orders.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(order)
    }

    async fn delete_basket(&self, actor: Actor, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        let order = self.own_order(&mut tx, actor, id).await?;
        self.orders.delete(&mut tx, order.id()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn confirm_basket(&self, actor: Actor, contact_id: Option<i64>) -> Result<Order, ServiceError> {
        let mut tx = self.db.begin().await?;
        let mut basket = self.orders.find_basket(&mut tx, actor.id).await?.ok_or(OrderError::EmptyBasket)?;
        basket.ensure_confirmable()?;
        let contact_id = contact_id.ok_or(OrderError::ContactRequired)?;
        let contact = self
            .contacts
            .find(&mut tx, contact_id)
            .await?
            .filter(|contact| contact.user_id == actor.id)
            .ok_or(OrderError::ContactNotFound)?;

        basket.confirm(&contact)?;
        self.orders.save(&mut tx, &basket).await?;
        tx.commit().await?;

        tracing::info!(order_id = basket.id(), user_id = actor.id, contact_id, "order confirmed");
        dispatch_events(self.queue.as_ref(), basket.take_events()).await;
        Ok(basket)
    }

    async fn user_orders(&self, actor: Actor) -> Result<Vec<Order>, ServiceError> {
        let filter = OrderFilter { user_id: Some(actor.id), status: Some(OrderStatus::Confirmed), ..Default::default() };
        Ok(self.page(filter).await?.items)
    }

    async fn partner_orders(&self, actor: Actor) -> Result<Vec<Order>, ServiceError> {
        let mut tx = self.db.begin().await?;
        let shops = self.shops.owned_by(&mut tx, actor.id).await?;
        if shops.is_empty() {
            return Err(ServiceError::Rejected("Вы не связаны с магазином.".to_string()));
        }
        let filter = OrderFilter { supplier: Some(actor.id), status: Some(OrderStatus::Confirmed), ..Default::default() };
        let orders = self.orders.list(&mut tx, filter).await?;
        tx.commit().await?;
        Ok(orders)
    }

    async fn list_orders(&self, page: PageRequest) -> Result<Page<Order>, ServiceError> {
        self.page(OrderFilter { limit: page.limit, offset: page.offset, ..Default::default() }).await
    }

    async fn get_order(&self, id: i64) -> Result<Order, ServiceError> {
        let mut tx = self.db.begin().await?;
        let order = self.orders.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;
        Ok(order)
    }

    async fn create_order(&self, user_id: i64, lines: Vec<BasketLine>) -> Result<Order, ServiceError> {
        self.fill_basket(user_id, lines).await
    }

    async fn update_order(
        &self,
        id: i64,
        lines: Option<Vec<BasketLine>>,
        status: Option<OrderStatus>,
    ) -> Result<Order, ServiceError> {
        let mut tx = self.db.begin().await?;
        let mut order = self.orders.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        let previous = order.status();
        if let Some(lines) = &lines {
            let offers = self.offers_for(&mut tx, lines).await?;
            order.replace_items(lines, &offers)?;
        }
        if let Some(status) = status {
            order.transition_to(status)?;
        }
        self.orders.save(&mut tx, &order).await?;
        let events = order.take_events();
        let order = self.orders.find(&mut tx, id).await?.ok_or(ServiceError::NotFound)?;
        tx.commit().await?;

        if previous != order.status() {
            tracing::info!(order_id = id, from = %previous, to = %order.status(), "order status changed");
        }
        dispatch_events(self.queue.as_ref(), events).await;
        Ok(order)
    }

    async fn delete_order(&self, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        if self.orders.delete(&mut tx, id).await? == 0 {
            return Err(ServiceError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrdersService: Send + Sync {
    /// All orders placed by the actor, baskets included.
    async fn list_basket(&self, actor: Actor, page: PageRequest) -> Result<Page<Order>, ServiceError>;

    async fn get_basket(&self, actor: Actor, id: i64) -> Result<Order, ServiceError>;

    /// Adds lines to the actor's basket, merging repeated products.
    async fn add_to_basket(&self, actor: Actor, lines: Vec<BasketLine>) -> Result<Order, ServiceError>;

    /// Replaces the items of one of the actor's open orders.
    async fn update_basket(&self, actor: Actor, id: i64, lines: Vec<BasketLine>) -> Result<Order, ServiceError>;

    async fn delete_basket(&self, actor: Actor, id: i64) -> Result<(), ServiceError>;

    /// Confirms the actor's basket for delivery to one of their contacts.
    async fn confirm_basket(&self, actor: Actor, contact_id: Option<i64>) -> Result<Order, ServiceError>;

    /// The actor's confirmed orders.
    async fn user_orders(&self, actor: Actor) -> Result<Vec<Order>, ServiceError>;

    /// Confirmed orders containing items from shops the actor owns.
    async fn partner_orders(&self, actor: Actor) -> Result<Vec<Order>, ServiceError>;

    async fn list_orders(&self, page: PageRequest) -> Result<Page<Order>, ServiceError>;

    async fn get_order(&self, id: i64) -> Result<Order, ServiceError>;

    /// Adds lines to `user_id`'s basket on their behalf.
    async fn create_order(&self, user_id: i64, lines: Vec<BasketLine>) -> Result<Order, ServiceError>;

    /// Replaces items and/or moves the order along the status graph.
    async fn update_order(
        &self,
        id: i64,
        lines: Option<Vec<BasketLine>>,
        status: Option<OrderStatus>,
    ) -> Result<Order, ServiceError>;

    async fn delete_order(&self, id: i64) -> Result<(), ServiceError>;
}
