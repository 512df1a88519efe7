use common::{OrderId, UserId};
use domain::{Order, OrderStatus, Payment, PaymentStatus};

/// Filter for order list queries.
///
/// Results are always returned newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Only orders placed by this user.
    pub user_id: Option<UserId>,

    /// Only orders in this status.
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// Creates a filter matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter for one user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Filters by user.
    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns true if the order passes every set criterion.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id != user_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        true
    }
}

/// Filter for payment list queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    pub user_id: Option<UserId>,
    pub status: Option<PaymentStatus>,
    pub order_id: Option<OrderId>,
}

impl PaymentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn status(mut self, status: PaymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        if let Some(user_id) = self.user_id
            && payment.user_id != user_id
        {
            return false;
        }
        if let Some(status) = self.status
            && payment.status != status
        {
            return false;
        }
        if let Some(order_id) = self.order_id
            && payment.order_id != order_id
        {
            return false;
        }
        true
    }
}
