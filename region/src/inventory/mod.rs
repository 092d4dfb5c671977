//! Authoritative store for hosts, subnets, ranges, interfaces, address records
//! and the audit log.
//!
//! All state lives in one [`Tables`] value behind an async mutex. Each mutating
//! method validates against the locked tables, writes through to the database
//! when one is configured, applies the change in memory and finally publishes a
//! fresh snapshot on a watch channel. A failure at any step leaves memory
//! untouched. Readers use [`Inventory::snapshot`], which never blocks on writers.
//!
//! The audit log is append-only and kept out of the snapshots. With a database
//! it's read back from there on request.

pub mod db;

use alloc::sync::Arc;
use core::net::IpAddr;
use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use ipnet::IpNet;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

pub use db::DbPool;

use crate::{
    address_space::{AddressSpaceReport, StatisticsSettings, SubnetSnapshot, compute},
    error::CoreError,
    ipam::{self, AssignRequest, Origin},
    lifecycle::PlannedTransition,
    model::{
        AddressRecord, AddressType, AuditEntry, Host, HostId, HostKind, Interface, InterfaceId,
        InterfaceKind, IpRange, IpRangeKind, RdnsMode, Subnet, SubnetId,
    },
};

pub type InventoryRx = watch::Receiver<Arc<Tables>>;

/// Plain copy of the whole inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub hosts: BTreeMap<HostId, Host>,
    pub subnets: BTreeMap<SubnetId, Subnet>,
    pub ranges: BTreeMap<i64, IpRange>,
    pub interfaces: BTreeMap<InterfaceId, Interface>,
    /// Keyed by address; an address has at most one record.
    pub addresses: BTreeMap<IpAddr, AddressRecord>,
    /// Next id handed out, shared by every entity kind.
    next_id: i64,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            hosts: BTreeMap::new(),
            subnets: BTreeMap::new(),
            ranges: BTreeMap::new(),
            interfaces: BTreeMap::new(),
            addresses: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl Tables {
    /// Continues numbering after the highest stored id, audit entries included.
    fn reset_next_id(&mut self, last_audit: Option<i64>) {
        let highest = [
            self.hosts.keys().max().copied(),
            self.subnets.keys().max().copied(),
            self.ranges.keys().max().copied(),
            self.interfaces.keys().max().copied(),
            self.addresses.values().map(|a| a.id).max(),
            last_audit,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0);
        self.next_id = highest + 1;
    }

    pub fn ranges_of(&self, subnet_id: SubnetId) -> impl Iterator<Item = &IpRange> {
        self.ranges.values().filter(move |r| r.subnet_id == subnet_id)
    }

    pub fn addresses_of(&self, subnet_id: SubnetId) -> impl Iterator<Item = &AddressRecord> {
        self.addresses
            .values()
            .filter(move |a| a.subnet_id == subnet_id)
    }

    pub fn subnets_containing(&self, ip: IpAddr) -> impl Iterator<Item = &Subnet> {
        self.subnets.values().filter(move |s| s.cidr.contains(&ip))
    }

    /// The most specific known subnet containing `ip`.
    #[must_use]
    pub fn longest_match(&self, ip: IpAddr) -> Option<&Subnet> {
        self.subnets_containing(ip).max_by_key(|s| s.cidr.prefix_len())
    }

    #[must_use]
    pub fn host_by_name(&self, hostname: &str) -> Option<&Host> {
        self.hosts.values().find(|h| h.hostname == hostname)
    }

    /// Hostnames of rack controllers with a live interface linked to `subnet_id`.
    #[must_use]
    pub fn rack_hosts_on(&self, subnet_id: SubnetId) -> BTreeSet<String> {
        self.interfaces
            .values()
            .filter(|i| i.link_up && i.subnet_id == Some(subnet_id))
            .filter_map(|i| self.hosts.get(&i.host_id?))
            .filter(|h| h.kind.is_rack_controller())
            .map(|h| h.hostname.clone())
            .collect()
    }

    /// Statistics over a consistent view of one subnet.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for unknown subnets, otherwise see [`compute`].
    pub fn statistics(
        &self,
        subnet_id: SubnetId,
        settings: StatisticsSettings,
    ) -> Result<AddressSpaceReport, CoreError> {
        let subnet = self
            .subnets
            .get(&subnet_id)
            .ok_or_else(|| CoreError::NotFound(format!("Subnet {subnet_id}")))?;
        let ranges: Vec<IpRange> = self.ranges_of(subnet_id).cloned().collect();
        let allocated: Vec<IpAddr> = self.addresses_of(subnet_id).map(|a| a.ip).collect();
        compute(
            &SubnetSnapshot {
                cidr: subnet.cidr,
                gateway: subnet.gateway_ip,
                ranges: &ranges,
                allocated: &allocated,
            },
            settings,
        )
    }
}

/// Fields accepted when creating a subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubnet {
    pub cidr: IpNet,
    pub name: Option<String>,
    pub description: String,
    pub vlan: Option<u16>,
    pub space: Option<String>,
    pub rdns_mode: RdnsMode,
    pub gateway_ip: Option<IpAddr>,
    pub managed: bool,
    pub allow_proxy: bool,
    pub active_discovery: bool,
    pub dns_servers: Vec<IpAddr>,
}

impl NewSubnet {
    /// A managed subnet with every optional field at its default.
    #[must_use]
    pub const fn new(cidr: IpNet) -> Self {
        Self {
            cidr,
            name: None,
            description: String::new(),
            vlan: None,
            space: None,
            rdns_mode: RdnsMode::Rfc2317,
            gateway_ip: None,
            managed: true,
            allow_proxy: true,
            active_discovery: false,
            dns_servers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRange {
    pub subnet_id: SubnetId,
    pub start: IpAddr,
    pub end: IpAddr,
    pub kind: IpRangeKind,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInterface {
    pub name: String,
    pub kind: InterfaceKind,
    pub host_id: Option<HostId>,
    pub mac: Option<String>,
    pub subnet_id: Option<SubnetId>,
    pub link_up: bool,
}

pub struct Inventory {
    inner: Mutex<Tables>,
    tx: watch::Sender<Arc<Tables>>,
    db: Option<DbPool>,
    /// Audit entries, only held here when there is no database.
    audit: Mutex<Vec<AuditEntry>>,
}

impl Inventory {
    /// Wraps `initial` tables, persisting later changes to `db` if given.
    #[must_use]
    pub fn new(initial: Tables, db: Option<DbPool>) -> Arc<Self> {
        let (tx, _) = watch::channel(Arc::new(initial.clone()));
        Arc::new(Self {
            inner: Mutex::new(initial),
            tx,
            db,
            audit: Mutex::new(Vec::new()),
        })
    }

    /// Loads the tables from `db`, or starts empty without one.
    pub async fn open(db: Option<DbPool>) -> Result<Arc<Self>, CoreError> {
        let tables = match db {
            Some(ref pool) => db::load(pool).await?,
            None => Tables::default(),
        };
        Ok(Self::new(tables, db))
    }

    /// Current published state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Tables> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> InventoryRx {
        self.tx.subscribe()
    }

    fn publish(&self, tables: &Tables) {
        self.tx.send_replace(Arc::new(tables.clone()));
    }

    #[tracing::instrument(skip_all, fields(cidr = %new.cidr))]
    pub async fn create_subnet(&self, new: NewSubnet) -> Result<Subnet, CoreError> {
        let mut tables = self.inner.lock().await;
        let subnet = Subnet {
            id: tables.next_id,
            name: new.name.unwrap_or_else(|| new.cidr.to_string()),
            description: new.description,
            cidr: new.cidr,
            vlan: new.vlan,
            space: new.space,
            rdns_mode: new.rdns_mode,
            gateway_ip: new.gateway_ip,
            managed: new.managed,
            allow_proxy: new.allow_proxy,
            active_discovery: new.active_discovery,
            dns_servers: new.dns_servers,
        };
        subnet.validate()?;
        if let Some(existing) = tables.subnets.values().find(|s| {
            s.cidr.contains(&subnet.cidr.network()) || subnet.cidr.contains(&s.cidr.network())
        }) {
            return Err(CoreError::conflict(format!(
                "Subnet {} overlaps existing subnet {}",
                subnet.cidr, existing.cidr
            )));
        }
        if let Some(ref pool) = self.db {
            db::insert_subnet(pool, &subnet).await?;
        }
        tables.next_id += 1;
        tables.subnets.insert(subnet.id, subnet.clone());
        self.publish(&tables);
        info!("Created subnet {} ({})", subnet.cidr, subnet.id);
        Ok(subnet)
    }

    /// Deletes a subnet with its ranges and address records; interfaces linked
    /// to it are unlinked.
    #[tracing::instrument(skip(self))]
    pub async fn delete_subnet(&self, id: SubnetId) -> Result<Subnet, CoreError> {
        let mut tables = self.inner.lock().await;
        let Some(subnet) = tables.subnets.get(&id).cloned() else {
            return Err(CoreError::NotFound(format!("Subnet {id}")));
        };
        if let Some(ref pool) = self.db {
            db::delete_subnet(pool, id).await?;
        }
        tables.subnets.remove(&id);
        tables.ranges.retain(|_, r| r.subnet_id != id);
        tables.addresses.retain(|_, a| a.subnet_id != id);
        for interface in tables.interfaces.values_mut() {
            if interface.subnet_id == Some(id) {
                interface.subnet_id = None;
            }
        }
        self.publish(&tables);
        info!("Deleted subnet {}", subnet.cidr);
        Ok(subnet)
    }

    #[tracing::instrument(skip_all, fields(subnet_id = new.subnet_id))]
    pub async fn add_range(&self, new: NewRange) -> Result<IpRange, CoreError> {
        let mut tables = self.inner.lock().await;
        let Some(subnet) = tables.subnets.get(&new.subnet_id) else {
            return Err(CoreError::NotFound(format!("Subnet {}", new.subnet_id)));
        };
        let range = IpRange {
            id: tables.next_id,
            subnet_id: new.subnet_id,
            start: new.start,
            end: new.end,
            kind: new.kind,
            comment: new.comment,
        };
        range.validate_within(subnet.cidr)?;
        if let Some(other) = tables.ranges_of(new.subnet_id).find(|r| r.overlaps(&range)) {
            return Err(CoreError::conflict(format!(
                "Range {}-{} overlaps existing {} range {}-{}",
                range.start, range.end, other.kind, other.start, other.end
            )));
        }
        if let Some(ref pool) = self.db {
            db::insert_range(pool, &range).await?;
        }
        tables.next_id += 1;
        tables.ranges.insert(range.id, range.clone());
        self.publish(&tables);
        Ok(range)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_host(&self, hostname: &str, kind: HostKind) -> Result<Host, CoreError> {
        let mut tables = self.inner.lock().await;
        self.insert_host(&mut tables, hostname, kind).await
    }

    async fn insert_host(
        &self,
        tables: &mut Tables,
        hostname: &str,
        kind: HostKind,
    ) -> Result<Host, CoreError> {
        if hostname.trim().is_empty() {
            return Err(CoreError::validation("Hostname must not be empty"));
        }
        if tables.host_by_name(hostname).is_some() {
            return Err(CoreError::conflict(format!(
                "Host '{hostname}' already exists"
            )));
        }
        let host = Host::new(tables.next_id, hostname.to_owned(), kind);
        if let Some(ref pool) = self.db {
            db::insert_host(pool, &host).await?;
        }
        tables.next_id += 1;
        tables.hosts.insert(host.id, host.clone());
        self.publish(tables);
        Ok(host)
    }

    /// Creates a rack-controller host for every name that has none yet.
    ///
    /// Returns the hosts that were created.
    pub async fn ensure_rack_hosts<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<Vec<Host>, CoreError> {
        let mut tables = self.inner.lock().await;
        let mut created = Vec::new();
        for name in names {
            if tables.host_by_name(name).is_none() {
                let host = self
                    .insert_host(&mut tables, name, HostKind::RackController)
                    .await?;
                info!("Registered rack controller host '{name}'");
                created.push(host);
            }
        }
        Ok(created)
    }

    /// Deletes a host; its interfaces remain, unlinked.
    #[tracing::instrument(skip(self))]
    pub async fn delete_host(&self, id: HostId) -> Result<Host, CoreError> {
        let mut tables = self.inner.lock().await;
        let Some(host) = tables.hosts.get(&id).cloned() else {
            return Err(CoreError::NotFound(format!("Host {id}")));
        };
        if let Some(ref pool) = self.db {
            db::delete_host(pool, id).await?;
        }
        tables.hosts.remove(&id);
        for interface in tables.interfaces.values_mut() {
            if interface.host_id == Some(id) {
                interface.host_id = None;
            }
        }
        self.publish(&tables);
        Ok(host)
    }

    /// Stores `planned` only if the host is still in `planned.from`.
    ///
    /// # Errors
    ///
    /// A retryable [`CoreError::Conflict`] when another writer got there first.
    pub async fn compare_and_set_status(
        &self,
        id: HostId,
        planned: &PlannedTransition,
    ) -> Result<Host, CoreError> {
        let mut tables = self.inner.lock().await;
        let Some(current) = tables.hosts.get(&id) else {
            return Err(CoreError::NotFound(format!("Host {id}")));
        };
        if current.status != planned.from {
            return Err(CoreError::stale(format!(
                "Host {} changed from {} to {} concurrently",
                current.hostname, planned.from, current.status
            )));
        }
        if let Some(ref pool) = self.db
            && !db::compare_and_set_status(pool, id, planned).await?
        {
            return Err(CoreError::stale(format!(
                "Host {id} changed concurrently"
            )));
        }
        let mut updated = current.clone();
        updated.status = planned.to;
        updated.owner.clone_from(&planned.owner);
        tables.hosts.insert(id, updated.clone());
        self.publish(&tables);
        Ok(updated)
    }

    pub async fn create_interface(&self, new: NewInterface) -> Result<Interface, CoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(host_id) = new.host_id
            && !tables.hosts.contains_key(&host_id)
        {
            return Err(CoreError::NotFound(format!("Host {host_id}")));
        }
        if let Some(subnet_id) = new.subnet_id
            && !tables.subnets.contains_key(&subnet_id)
        {
            return Err(CoreError::NotFound(format!("Subnet {subnet_id}")));
        }
        let interface = Interface {
            id: tables.next_id,
            name: new.name,
            kind: new.kind,
            host_id: new.host_id,
            mac: new.mac.map(|m| m.to_ascii_lowercase()),
            subnet_id: new.subnet_id,
            link_up: new.link_up,
        };
        if let Some(ref pool) = self.db {
            db::insert_interface(pool, &interface).await?;
        }
        tables.next_id += 1;
        tables.interfaces.insert(interface.id, interface.clone());
        self.publish(&tables);
        Ok(interface)
    }

    /// Deletes an interface along with the address records assigned to it.
    pub async fn delete_interface(&self, id: InterfaceId) -> Result<Interface, CoreError> {
        let mut tables = self.inner.lock().await;
        let Some(interface) = tables.interfaces.get(&id).cloned() else {
            return Err(CoreError::NotFound(format!("Interface {id}")));
        };
        if let Some(ref pool) = self.db {
            db::delete_interface(pool, id).await?;
        }
        tables.interfaces.remove(&id);
        tables.addresses.retain(|_, a| a.interface_id != Some(id));
        self.publish(&tables);
        Ok(interface)
    }

    /// Checks and inserts an address record in one critical section.
    #[tracing::instrument(skip(self))]
    pub async fn assign_address(
        &self,
        request: AssignRequest,
        origin: Origin,
    ) -> Result<AddressRecord, CoreError> {
        let mut tables = self.inner.lock().await;
        let subnet_id = ipam::check_assign(&tables, &request, origin)?;
        let record = AddressRecord {
            id: tables.next_id,
            ip: request.ip,
            subnet_id,
            kind: request.kind,
            interface_id: request.interface_id,
            mac: request.mac.map(|m| m.to_ascii_lowercase()),
            created: Utc::now(),
        };
        if let Some(ref pool) = self.db {
            db::insert_address(pool, &record).await?;
        }
        tables.next_id += 1;
        tables.addresses.insert(record.ip, record.clone());
        self.publish(&tables);
        Ok(record)
    }

    /// Removes the record for `ip`. Missing records are not an error.
    pub async fn release_address(&self, ip: IpAddr) -> Result<Option<AddressRecord>, CoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.addresses.contains_key(&ip) {
            debug!("Release of unrecorded address {ip} ignored");
            return Ok(None);
        }
        if let Some(ref pool) = self.db {
            db::delete_address(pool, ip).await?;
        }
        let removed = tables.addresses.remove(&ip);
        self.publish(&tables);
        Ok(removed)
    }

    /// Records an address seen on the wire, unless it's outside every known
    /// subnet, already recorded, or not assignable.
    pub async fn observe(&self, ip: IpAddr, mac: &str) -> Result<Option<AddressRecord>, CoreError> {
        let mut recorded = self.observe_all([(ip, mac)]).await?;
        Ok(recorded.pop())
    }

    /// Records a batch of observed `(address, mac)` pairs under one lock, in
    /// one transaction and with one published snapshot. Pairs that [`observe`]
    /// would skip are skipped, as are repeats of an address within the batch.
    ///
    /// Returns the records created.
    ///
    /// [`observe`]: Self::observe
    #[tracing::instrument(skip_all)]
    pub async fn observe_all<'m>(
        &self,
        seen: impl IntoIterator<Item = (IpAddr, &'m str)>,
    ) -> Result<Vec<AddressRecord>, CoreError> {
        let mut tables = self.inner.lock().await;
        let now = Utc::now();
        let mut next_id = tables.next_id;
        let mut staged: BTreeMap<IpAddr, AddressRecord> = BTreeMap::new();
        for (ip, mac) in seen {
            if staged.contains_key(&ip) {
                continue;
            }
            let request = AssignRequest {
                ip,
                kind: AddressType::Discovered,
                interface_id: None,
                mac: Some(mac.to_ascii_lowercase()),
            };
            let subnet_id = match ipam::check_assign(&tables, &request, Origin::Observation) {
                Ok(subnet_id) => subnet_id,
                Err(CoreError::Validation(reason)) => {
                    debug!("Not recording observed {ip}: {reason}");
                    continue;
                }
                Err(CoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            };
            staged.insert(
                ip,
                AddressRecord {
                    id: next_id,
                    ip,
                    subnet_id,
                    kind: request.kind,
                    interface_id: None,
                    mac: request.mac,
                    created: now,
                },
            );
            next_id += 1;
        }
        let recorded: Vec<AddressRecord> = staged.into_values().collect();
        if recorded.is_empty() {
            return Ok(recorded);
        }
        if let Some(ref pool) = self.db {
            db::insert_addresses(pool, &recorded).await?;
        }
        tables.next_id = next_id;
        tables
            .addresses
            .extend(recorded.iter().map(|r| (r.ip, r.clone())));
        self.publish(&tables);
        debug!("Recorded {} observed addresses", recorded.len());
        Ok(recorded)
    }

    /// Appends an entry to the durable audit log.
    pub async fn record_audit(
        &self,
        user: &str,
        action: &str,
        subnet: &Subnet,
        detail: String,
    ) -> Result<AuditEntry, CoreError> {
        let mut tables = self.inner.lock().await;
        let entry = AuditEntry {
            id: tables.next_id,
            timestamp: Utc::now(),
            user: user.to_owned(),
            action: action.to_owned(),
            subnet_id: subnet.id,
            cidr: subnet.cidr.to_string(),
            detail,
        };
        match self.db {
            Some(ref pool) => db::insert_audit(pool, &entry).await?,
            None => self.audit.lock().await.push(entry.clone()),
        }
        tables.next_id += 1;
        Ok(entry)
    }

    /// The audit log, oldest first.
    pub async fn audit_entries(&self) -> Result<Vec<AuditEntry>, CoreError> {
        match self.db {
            Some(ref pool) => Ok(db::load_audit(pool).await?),
            None => Ok(self.audit.lock().await.clone()),
        }
    }
}
