use super::super::super::broker::{BrokerError, ConsumerTag, Delivery};
use super::super::super::topology::{
    predeclared_exchanges, routes, ExchangeDescriptor, QueueDescriptor, DEFAULT_EXCHANGE,
    RESERVED_EXCHANGE_PREFIX,
};
use futures::channel::mpsc::UnboundedSender;
use std::collections::{BTreeSet, HashMap, VecDeque};

pub(super) struct QueueState {
    descriptor: QueueDescriptor,
    buffer: VecDeque<Delivery>,
    consumers: Vec<(ConsumerTag, UnboundedSender<Delivery>)>,
    cursor: usize,
}

impl QueueState {
    fn new(descriptor: QueueDescriptor) -> Self {
        Self {
            descriptor,
            buffer: VecDeque::new(),
            consumers: Vec::new(),
            cursor: 0,
        }
    }

    pub(super) fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub(super) fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Registers a consumer and hands it everything that has been waiting in the queue
    pub(super) fn attach(&mut self, tag: ConsumerTag, tx: UnboundedSender<Delivery>) {
        self.consumers.push((tag, tx));

        while let Some(delivery) = self.buffer.pop_front() {
            self.deliver(delivery);
        }
    }

    /// Hands the delivery to the next consumer in round-robin order, dropping disconnected ones
    fn deliver(&mut self, mut delivery: Delivery) {
        while !self.consumers.is_empty() {
            let index = self.cursor % self.consumers.len();

            match self.consumers[index].1.unbounded_send(delivery) {
                Ok(()) => {
                    self.cursor = index + 1;
                    return;
                }
                Err(error) => {
                    delivery = error.into_inner();
                    self.consumers.remove(index);
                }
            }
        }

        self.buffer.push_back(delivery);
    }

    fn detach(&mut self, tag: &str) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|(consumer, _)| consumer != tag);
        before != self.consumers.len()
    }
}

struct ExchangeState {
    descriptor: ExchangeDescriptor,
    /// Pairs of routing key and queue name
    bindings: BTreeSet<(String, String)>,
}

pub(super) struct BrokerState {
    queues: HashMap<String, QueueState>,
    exchanges: HashMap<String, ExchangeState>,
}

impl BrokerState {
    pub(super) fn new() -> Self {
        let exchanges = predeclared_exchanges()
            .iter()
            .map(|descriptor| {
                let state = ExchangeState {
                    descriptor: descriptor.clone(),
                    bindings: BTreeSet::new(),
                };

                (descriptor.name().to_owned(), state)
            })
            .collect();

        Self {
            queues: HashMap::new(),
            exchanges,
        }
    }

    pub(super) fn queue(&self, name: &str) -> Option<&QueueState> {
        self.queues.get(name)
    }

    pub(super) fn queue_mut(&mut self, name: &str) -> Option<&mut QueueState> {
        self.queues.get_mut(name)
    }

    pub(super) fn bindings(&self, exchange: &str) -> Vec<(String, String)> {
        self.exchanges
            .get(exchange)
            .map(|exchange| exchange.bindings.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(super) fn declare_queue(&mut self, descriptor: &QueueDescriptor) -> Result<(), BrokerError> {
        match self.queues.get(descriptor.name()) {
            Some(existing) if existing.descriptor != *descriptor => Err(
                BrokerError::PreconditionFailed(descriptor.name().to_owned()),
            ),
            Some(_) => Ok(()),
            None => {
                self.queues.insert(
                    descriptor.name().to_owned(),
                    QueueState::new(descriptor.clone()),
                );
                Ok(())
            }
        }
    }

    pub(super) fn declare_exchange(
        &mut self,
        descriptor: &ExchangeDescriptor,
    ) -> Result<(), BrokerError> {
        let name = descriptor.name();

        match self.exchanges.get(name) {
            _ if name == DEFAULT_EXCHANGE => Err(BrokerError::AccessRefused(name.to_owned())),
            Some(existing) if existing.descriptor.is_equivalent(descriptor) => Ok(()),
            Some(_) if name.starts_with(RESERVED_EXCHANGE_PREFIX) => {
                Err(BrokerError::AccessRefused(name.to_owned()))
            }
            Some(_) => Err(BrokerError::PreconditionFailed(name.to_owned())),
            None if name.starts_with(RESERVED_EXCHANGE_PREFIX) => {
                Err(BrokerError::AccessRefused(name.to_owned()))
            }
            None => {
                self.exchanges.insert(
                    name.to_owned(),
                    ExchangeState {
                        descriptor: descriptor.clone(),
                        bindings: BTreeSet::new(),
                    },
                );
                Ok(())
            }
        }
    }

    pub(super) fn bind(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        if exchange == DEFAULT_EXCHANGE {
            return Err(BrokerError::AccessRefused(exchange.to_owned()));
        }

        if !self.queues.contains_key(queue) {
            return Err(BrokerError::QueueNotFound(queue.to_owned()));
        }

        self.exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_owned()))?
            .bindings
            .insert((routing_key.to_owned(), queue.to_owned()));

        Ok(())
    }

    /// Routes the delivery into all matching queues and returns how many there were
    ///
    /// Messages which can not be routed are dropped silently.
    pub(super) fn publish(&mut self, delivery: Delivery) -> Result<usize, BrokerError> {
        let targets: BTreeSet<String> = if delivery.exchange == DEFAULT_EXCHANGE {
            std::iter::once(delivery.routing_key.clone()).collect()
        } else {
            let exchange = self
                .exchanges
                .get(&delivery.exchange)
                .ok_or_else(|| BrokerError::ExchangeNotFound(delivery.exchange.clone()))?;
            let kind = exchange.descriptor.kind();

            exchange
                .bindings
                .iter()
                .filter(|(binding_key, _)| routes(kind, binding_key, &delivery.routing_key))
                .map(|(_, queue)| queue.clone())
                .collect()
        };

        let mut routed = 0;
        for target in targets {
            if let Some(queue) = self.queues.get_mut(&target) {
                queue.deliver(delivery.clone());
                routed += 1;
            }
        }

        Ok(routed)
    }

    /// Removes the consumer, deleting its queue if it was the last consumer of an auto-delete queue
    pub(super) fn cancel(&mut self, tag: &str) {
        let owner = self
            .queues
            .iter_mut()
            .find_map(|(name, queue)| queue.detach(tag).then(|| name.clone()));

        let obsolete = owner.filter(|name| {
            self.queues
                .get(name)
                .map(|queue| queue.descriptor.is_auto_delete() && queue.consumers.is_empty())
                .unwrap_or_default()
        });

        if let Some(name) = obsolete {
            self.queues.remove(&name);

            for exchange in self.exchanges.values_mut() {
                exchange.bindings.retain(|(_, queue)| *queue != name);
            }
        }
    }
}
