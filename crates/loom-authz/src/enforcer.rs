// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The enforcer: model, policy, role graphs and adapter behind one facade.
//!
//! All evaluation state lives in a single [`RwLock`]. Decisions take the read
//! lock and mutations take the write lock, so a decision always sees the
//! complete state from before or after a mutation, never a mixture. The
//! adapter sits behind its own mutex, which is always acquired before the
//! state lock; reloads read the adapter and build fresh state without blocking
//! decisions and only take the write lock to swap it in. The decision cache is
//! cleared while the write lock is still held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::adapter::{Adapter, Filter, PolicyLine};
use crate::cache::DecisionCache;
use crate::config::EnforcerConfig;
use crate::effect::{EffectKind, RuleOutcome};
use crate::error::{AuthzError, Result};
use crate::matcher::{CompiledMatcher, CustomFn, FunctionMap};
use crate::model::{Model, Section, EFFECT_TOKEN, PRIORITY_TOKEN};
use crate::policy::PolicyStore;
use crate::rbac::RoleManager;
use crate::watcher::{Watcher, WatcherSlot};

/// Selects which `r`/`p`/`e`/`m` family a request is evaluated with.
///
/// The default context uses `m` and `e`. `EnforceContext::new("2")` uses `m2`
/// and `e2`; the matcher in turn reads `r2`/`p2` when the model defines them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforceContext {
	suffix: String,
}

impl EnforceContext {
	pub fn new(suffix: impl Into<String>) -> Self {
		Self {
			suffix: suffix.into(),
		}
	}

	pub fn suffix(&self) -> &str {
		&self.suffix
	}
}

/// Model-derived state, replaced by [`Enforcer::set_model`] and
/// [`Enforcer::add_function`].
#[derive(Debug)]
struct Compiled {
	model: Arc<Model>,
	functions: FunctionMap,
	matchers: HashMap<String, CompiledMatcher>,
	effects: HashMap<String, EffectKind>,
}

impl Compiled {
	fn new(model: Arc<Model>, functions: FunctionMap, config: &EnforcerConfig) -> Result<Self> {
		let options = config.matcher_options(&functions);
		let matchers = model
			.section(Section::Matcher)
			.map(|a| Ok((a.key().to_string(), CompiledMatcher::compile(&model, a.key(), &options)?)))
			.collect::<Result<HashMap<_, _>>>()?;
		let effects = model
			.section(Section::Effect)
			.map(|a| Ok((a.key().to_string(), EffectKind::parse(a.value())?)))
			.collect::<Result<HashMap<_, _>>>()?;
		Ok(Self {
			model,
			functions,
			matchers,
			effects,
		})
	}

	fn matcher(&self, suffix: &str) -> Result<&CompiledMatcher> {
		let key = format!("m{suffix}");
		self.matchers
			.get(&key)
			.ok_or(AuthzError::UnknownAssertion(key))
	}

	fn effect(&self, suffix: &str) -> Result<EffectKind> {
		let key = self.model.resolve(Section::Effect, suffix)?.key();
		self.effects
			.get(key)
			.copied()
			.ok_or_else(|| AuthzError::UnknownAssertion(key.to_string()))
	}
}

/// Policy-derived state, replaced by reloads and edited by mutations.
#[derive(Debug)]
pub(crate) struct PolicyState {
	pub(crate) store: PolicyStore,
	pub(crate) roles: RoleManager,
	/// Evaluation order of policy keys that declare a `priority` field.
	order: HashMap<String, Vec<usize>>,
}

impl PolicyState {
	fn build(model: &Model, lines: Vec<PolicyLine>, max_depth: Option<usize>) -> Result<Self> {
		let mut store = PolicyStore::new();
		for line in lines {
			validate_rule(model, &line.key, None, &line.rule)?;
			store.extend_unchecked(&line.key, [line.rule]);
		}
		let roles = RoleManager::build(model, &store, max_depth)?;
		let mut state = Self {
			store,
			roles,
			order: HashMap::new(),
		};
		for assertion in model.section(Section::Policy) {
			state.refresh_order(model, assertion.key())?;
		}
		Ok(state)
	}

	fn refresh_order(&mut self, model: &Model, key: &str) -> Result<()> {
		let Some(field) = model.get(key).and_then(|a| a.token_index(PRIORITY_TOKEN)) else {
			return Ok(());
		};
		let mut ranked = self
			.store
			.rules(key)
			.iter()
			.enumerate()
			.map(|(i, rule)| parse_priority(&rule[field]).map(|p| (p, i)))
			.collect::<Result<Vec<_>>>()?;
		ranked.sort_by_key(|(priority, _)| *priority);
		self.order
			.insert(key.to_string(), ranked.into_iter().map(|(_, i)| i).collect());
		Ok(())
	}

	fn evaluation_order(&self, key: &str) -> Box<dyn Iterator<Item = usize> + '_> {
		match self.order.get(key) {
			Some(order) => Box::new(order.iter().copied()),
			None => Box::new(0..self.store.len(key)),
		}
	}
}

#[derive(Debug)]
struct EnforcerState {
	compiled: Compiled,
	policy: PolicyState,
}

/// Read-only view handed to query helpers.
pub(crate) struct StateView<'a> {
	pub(crate) model: &'a Model,
	pub(crate) policy: &'a PolicyState,
}

/// Authorization enforcer. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Enforcer {
	state: RwLock<EnforcerState>,
	adapter: Mutex<Adapter>,
	config: EnforcerConfig,
	auto_save: AtomicBool,
	enabled: AtomicBool,
	/// Set while the in-memory policy came from a filtered load.
	filtered: AtomicBool,
	cache: Option<DecisionCache>,
	watcher: WatcherSlot,
}

impl Enforcer {
	/// Builds an enforcer from model text and an adapter with default options.
	pub fn new(model: &str, adapter: impl Into<Adapter>) -> Result<Self> {
		Self::with_config(model, adapter, EnforcerConfig::default())
	}

	pub fn with_config(model: &str, adapter: impl Into<Adapter>, config: EnforcerConfig) -> Result<Self> {
		Self::from_model(model.parse()?, adapter, config)
	}

	/// Compiles every matcher and effect of `model`, loads the adapter's
	/// policy and builds the role graphs. Any failure aborts construction.
	pub fn from_model(model: Model, adapter: impl Into<Adapter>, config: EnforcerConfig) -> Result<Self> {
		Self::from_model_with_functions(model, adapter, config, FunctionMap::default())
	}

	/// Like [`Enforcer::from_model`], with matcher functions registered before
	/// the model is compiled.
	pub fn from_model_with_functions(
		model: Model,
		adapter: impl Into<Adapter>,
		config: EnforcerConfig,
		functions: FunctionMap,
	) -> Result<Self> {
		let mut adapter = adapter.into();
		let compiled = Compiled::new(Arc::new(model), functions, &config)?;
		let lines = adapter.load_policy()?;
		let policy = PolicyState::build(&compiled.model, lines, config.max_role_depth)?;
		log_loaded(&policy.store);

		Ok(Self {
			state: RwLock::new(EnforcerState { compiled, policy }),
			adapter: Mutex::new(adapter),
			auto_save: AtomicBool::new(config.auto_save),
			enabled: AtomicBool::new(true),
			filtered: AtomicBool::new(false),
			cache: config.cache_capacity.map(DecisionCache::new),
			watcher: WatcherSlot::default(),
			config,
		})
	}

	pub fn config(&self) -> &EnforcerConfig {
		&self.config
	}

	pub fn model(&self) -> Arc<Model> {
		self.state.read().compiled.model.clone()
	}

	/// Whether mutations are written through to a read/write adapter.
	pub fn auto_save(&self) -> bool {
		self.auto_save.load(Ordering::Acquire)
	}

	pub fn set_auto_save(&self, enabled: bool) {
		self.auto_save.store(enabled, Ordering::Release);
	}

	/// Whether decisions are evaluated. A disabled enforcer allows every
	/// request without looking at it.
	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::Acquire)
	}

	pub fn enable_enforce(&self, enabled: bool) {
		self.enabled.store(enabled, Ordering::Release);
		info!(enabled, "enforcement toggled");
	}

	/// Whether the in-memory policy is a filtered subset of the adapter's.
	pub fn is_filtered(&self) -> bool {
		self.filtered.load(Ordering::Acquire)
	}

	/// Installs `watcher`, replacing any earlier one.
	pub fn set_watcher(&self, watcher: impl Watcher + 'static) {
		self.watcher.set(Some(Arc::new(watcher)));
	}

	pub fn clear_watcher(&self) {
		self.watcher.set(None);
	}

	/// Decides `rvals` with the default `r`/`p`/`e`/`m` family.
	#[instrument(level = "trace", skip_all, fields(request = ?rvals))]
	pub fn enforce(&self, rvals: &[&str]) -> Result<bool> {
		self.enforce_with(&EnforceContext::default(), rvals)
	}

	/// Decides `rvals` with the family selected by `ctx`.
	pub fn enforce_with(&self, ctx: &EnforceContext, rvals: &[&str]) -> Result<bool> {
		if !self.is_enabled() {
			debug!(request = ?rvals, "enforcement disabled, allowing request");
			return Ok(true);
		}
		let state = self.state.read();
		let matcher = state.compiled.matcher(ctx.suffix())?;

		if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(matcher.key(), rvals)) {
			debug!(request = ?rvals, allowed = cached, "cached authorization decision");
			return Ok(cached);
		}

		let (allowed, _) = self.decide(&state, ctx, rvals, false)?;
		if let Some(cache) = &self.cache {
			cache.insert(matcher.key(), rvals, allowed);
		}
		Ok(allowed)
	}

	/// Decides `rvals` and returns the rules that determined the outcome.
	pub fn enforce_ex(&self, rvals: &[&str]) -> Result<(bool, Vec<Vec<String>>)> {
		if !self.is_enabled() {
			return Ok((true, Vec::new()));
		}
		let state = self.state.read();
		self.decide(&state, &EnforceContext::default(), rvals, true)
	}

	fn decide(
		&self,
		state: &EnforcerState,
		ctx: &EnforceContext,
		rvals: &[&str],
		explain: bool,
	) -> Result<(bool, Vec<Vec<String>>)> {
		let matcher = state.compiled.matcher(ctx.suffix())?;
		let effect = state.compiled.effect(ctx.suffix())?;
		let model = &state.compiled.model;
		model.require(matcher.request_key())?.check_arity(rvals.len())?;

		let policy_key = matcher.policy_key();
		let eft_field = model.require(policy_key)?.token_index(EFFECT_TOKEN);
		let rules = state.policy.store.rules(policy_key);

		let mut stream = effect.stream();
		let mut evaluated = Vec::new();
		for index in state.policy.evaluation_order(policy_key) {
			let rule = &rules[index];
			let outcome = if matcher.evaluate(rvals, rule, &state.policy.roles)? {
				RuleOutcome::from_effect(eft_field.map(|i| rule[i].as_str()))
			} else {
				RuleOutcome::Indeterminate
			};
			evaluated.push(index);
			if stream.push(outcome) {
				break;
			}
		}

		let decision = stream.finish();
		if self.config.log_decisions {
			info!(
				request = ?rvals,
				allowed = decision.allowed,
				deciding = decision.deciding.len(),
				evaluated = evaluated.len(),
				"authorization decision"
			);
		} else {
			debug!(
				request = ?rvals,
				allowed = decision.allowed,
				deciding = decision.deciding.len(),
				evaluated = evaluated.len(),
				"authorization decision"
			);
		}

		let explanation = if explain {
			decision
				.deciding
				.iter()
				.map(|&position| rules[evaluated[position]].clone())
				.collect()
		} else {
			Vec::new()
		};
		Ok((decision.allowed, explanation))
	}

	/// Replaces all policy with what the adapter currently stores.
	pub fn load_policy(&self) -> Result<()> {
		let mut adapter = self.adapter.lock();
		let model = self.model();
		let lines = adapter.load_policy()?;
		let fresh = PolicyState::build(&model, lines, self.config.max_role_depth)?;
		log_loaded(&fresh.store);

		let mut state = self.state.write();
		state.policy = fresh;
		self.filtered.store(false, Ordering::Release);
		self.clear_cache();
		Ok(())
	}

	/// Replaces all policy with the subset of stored rules `filter` selects.
	/// Until the next full load, [`Enforcer::save_policy`] is refused so the
	/// subset cannot overwrite the complete stored policy.
	pub fn load_filtered_policy(&self, filter: &Filter) -> Result<()> {
		let mut adapter = self.adapter.lock();
		let model = self.model();
		let lines = adapter.load_filtered_policy(filter)?;
		let fresh = PolicyState::build(&model, lines, self.config.max_role_depth)?;
		log_loaded(&fresh.store);

		let mut state = self.state.write();
		state.policy = fresh;
		self.filtered.store(true, Ordering::Release);
		self.clear_cache();
		debug!(?filter, "loaded filtered policy");
		Ok(())
	}

	/// Writes all in-memory policy to the adapter, replacing what it stores.
	pub fn save_policy(&self) -> Result<()> {
		self.save_all()?;
		self.watcher.notify();
		Ok(())
	}

	fn save_all(&self) -> Result<()> {
		let mut adapter = self.adapter.lock();
		if self.is_filtered() {
			return Err(AuthzError::Adapter("cannot save a filtered policy".into()));
		}
		let persister = adapter
			.persister()
			.ok_or_else(|| AuthzError::Adapter("adapter is read-only".into()))?;
		let lines: Vec<PolicyLine> = self
			.state
			.read()
			.policy
			.store
			.iter()
			.map(|(key, rule)| PolicyLine::new(key, rule.to_vec()))
			.collect();
		persister.save_policy(&lines).inspect_err(|e| {
			warn!(error = %e, "failed to save policy");
		})?;
		info!(rules = lines.len(), "saved policy");
		Ok(())
	}

	/// Parses and compiles a new model, reloads policy against it and swaps
	/// both in at once. On error the current model stays in place.
	pub fn set_model(&self, model: &str) -> Result<()> {
		let model: Model = model.parse()?;
		let mut adapter = self.adapter.lock();
		let functions = self.state.read().compiled.functions.clone();
		let compiled = Compiled::new(Arc::new(model), functions, &self.config)?;
		let lines = adapter.load_policy()?;
		let policy = PolicyState::build(&compiled.model, lines, self.config.max_role_depth)?;
		log_loaded(&policy.store);

		let mut state = self.state.write();
		*state = EnforcerState { compiled, policy };
		self.filtered.store(false, Ordering::Release);
		self.clear_cache();
		Ok(())
	}

	/// Registers a two-argument matcher function and recompiles the current
	/// model with it. On error the registered functions and compiled
	/// matchers stay as they were.
	pub fn add_function(&self, name: &str, func: CustomFn) -> Result<()> {
		let _adapter = self.adapter.lock();
		let (model, mut functions) = {
			let state = self.state.read();
			(state.compiled.model.clone(), state.compiled.functions.clone())
		};
		functions.add(name, func)?;
		let compiled = Compiled::new(model, functions, &self.config)?;

		let mut state = self.state.write();
		state.compiled = compiled;
		self.clear_cache();
		debug!(function = name, "registered matcher function");
		Ok(())
	}

	/// Replaces the adapter and loads its policy.
	pub fn set_adapter(&self, adapter: impl Into<Adapter>) -> Result<()> {
		let mut adapter = adapter.into();
		let mut current = self.adapter.lock();
		let model = self.model();
		let lines = adapter.load_policy()?;
		let fresh = PolicyState::build(&model, lines, self.config.max_role_depth)?;
		log_loaded(&fresh.store);

		*current = adapter;
		let mut state = self.state.write();
		state.policy = fresh;
		self.filtered.store(false, Ordering::Release);
		self.clear_cache();
		Ok(())
	}

	/// Drops all in-memory policy without touching the adapter.
	pub fn clear_policy(&self) {
		let mut state = self.state.write();
		let roles = RoleManager::new(&state.compiled.model, self.config.max_role_depth);
		state.policy = PolicyState {
			store: PolicyStore::new(),
			roles,
			order: HashMap::new(),
		};
		self.clear_cache();
	}

	fn clear_cache(&self) {
		if let Some(cache) = &self.cache {
			cache.clear();
		}
	}

	pub(crate) fn view<R>(&self, f: impl FnOnce(StateView<'_>) -> R) -> R {
		let state = self.state.read();
		f(StateView {
			model: &state.compiled.model,
			policy: &state.policy,
		})
	}

	/// Adds `rules` under `key`, all or nothing. Returns `false` when any rule
	/// is already present.
	pub(crate) fn add_rules(&self, section: Section, key: &str, rules: Vec<Vec<String>>) -> Result<bool> {
		let changed = self.apply_add(section, key, rules)?;
		if changed {
			self.watcher.notify();
		}
		Ok(changed)
	}

	/// Removes `rules` from `key`, all or nothing. Returns `false` when any
	/// rule is missing.
	pub(crate) fn remove_rules(&self, section: Section, key: &str, rules: Vec<Vec<String>>) -> Result<bool> {
		let changed = self.apply_remove(section, key, rules)?;
		if changed {
			self.watcher.notify();
		}
		Ok(changed)
	}

	/// Removes every rule of `key` whose fields from `field_index` on match
	/// `values`, where an empty value matches anything.
	pub(crate) fn remove_filtered(
		&self,
		section: Section,
		key: &str,
		field_index: usize,
		values: Vec<String>,
	) -> Result<bool> {
		let changed = self.apply_remove_filtered(section, key, field_index, values)?;
		if changed {
			self.watcher.notify();
		}
		Ok(changed)
	}

	fn apply_add(&self, section: Section, key: &str, rules: Vec<Vec<String>>) -> Result<bool> {
		if rules.is_empty() {
			return Ok(false);
		}
		let mut adapter = self.adapter.lock();
		let mut guard = self.state.write();
		let state = &mut *guard;
		let model = &state.compiled.model;
		for rule in &rules {
			validate_rule(model, key, Some(section), rule)?;
		}
		if !can_add(&state.policy.store, key, &rules) {
			return Ok(false);
		}

		if let Some(persister) = adapter.persister().filter(|_| self.auto_save()) {
			let persisted = match rules.as_slice() {
				[rule] => persister.add_policy(key, rule),
				_ => persister.add_policies(key, &rules),
			};
			persisted.inspect_err(|e| {
				warn!(key, rules = rules.len(), error = %e, "failed to persist added rules");
			})?;
		}

		if section == Section::Role {
			let assertion = model.require(key)?;
			for rule in &rules {
				state.policy.roles.add_link(assertion, rule)?;
			}
		}
		debug!(key, rules = rules.len(), "added rules");
		state.policy.store.add_rules(key, rules);
		state.policy.refresh_order(model, key)?;
		self.clear_cache();
		Ok(true)
	}

	fn apply_remove(&self, section: Section, key: &str, rules: Vec<Vec<String>>) -> Result<bool> {
		if rules.is_empty() {
			return Ok(false);
		}
		let mut adapter = self.adapter.lock();
		let mut guard = self.state.write();
		let state = &mut *guard;
		let model = &state.compiled.model;
		for rule in &rules {
			validate_rule(model, key, Some(section), rule)?;
		}
		if !rules.iter().all(|rule| state.policy.store.has_rule(key, rule)) {
			return Ok(false);
		}

		if let Some(persister) = adapter.persister().filter(|_| self.auto_save()) {
			let persisted = match rules.as_slice() {
				[rule] => persister.remove_policy(key, rule),
				_ => persister.remove_policies(key, &rules),
			};
			persisted.inspect_err(|e| {
				warn!(key, rules = rules.len(), error = %e, "failed to persist removed rules");
			})?;
		}

		state.policy.store.remove_rules(key, &rules);
		if section == Section::Role {
			unlink_removed(model, &mut state.policy, key, &rules)?;
		}
		state.policy.refresh_order(model, key)?;
		debug!(key, rules = rules.len(), "removed rules");
		self.clear_cache();
		Ok(true)
	}

	fn apply_remove_filtered(
		&self,
		section: Section,
		key: &str,
		field_index: usize,
		values: Vec<String>,
	) -> Result<bool> {
		let mut adapter = self.adapter.lock();
		let mut guard = self.state.write();
		let state = &mut *guard;
		let model = &state.compiled.model;
		let assertion = model
			.get(key)
			.filter(|a| a.section() == section)
			.ok_or_else(|| AuthzError::UnknownAssertion(key.to_string()))?;
		if field_index + values.len() > assertion.arity() {
			return Err(AuthzError::arity(key, assertion.arity(), field_index + values.len()));
		}
		if values.iter().all(String::is_empty)
			|| state.policy.store.filtered(key, field_index, &values).is_empty()
		{
			return Ok(false);
		}

		if let Some(persister) = adapter.persister().filter(|_| self.auto_save()) {
			persister
				.remove_filtered_policy(key, field_index, &values)
				.inspect_err(|e| {
					warn!(key, field_index, error = %e, "failed to persist filtered removal");
				})?;
		}

		let removed = state.policy.store.remove_filtered(key, field_index, &values);
		if section == Section::Role {
			unlink_removed(model, &mut state.policy, key, &removed)?;
		}
		state.policy.refresh_order(model, key)?;
		debug!(key, field_index, rules = removed.len(), "removed filtered rules");
		self.clear_cache();
		Ok(true)
	}
}

/// Drops role links for removed rules unless a duplicate rule still holds them.
fn unlink_removed(model: &Model, policy: &mut PolicyState, key: &str, removed: &[Vec<String>]) -> Result<()> {
	let assertion = model.require(key)?;
	for rule in removed {
		if !policy.store.has_rule(key, rule) {
			policy.roles.remove_link(assertion, rule)?;
		}
	}
	Ok(())
}

fn can_add(store: &PolicyStore, key: &str, rules: &[Vec<String>]) -> bool {
	match rules {
		[rule] => !store.has_rule(key, rule),
		_ => {
			let mut probe = PolicyStore::new();
			rules.iter().all(|rule| !store.has_rule(key, rule) && probe.add_rule(key, rule.clone()))
		}
	}
}

/// Checks that `key` names a rule-holding assertion (of `section`, if given)
/// and that `rule` fits it.
fn validate_rule(model: &Model, key: &str, section: Option<Section>, rule: &[String]) -> Result<()> {
	let assertion = model
		.get(key)
		.filter(|a| matches!(a.section(), Section::Policy | Section::Role))
		.filter(|a| section.is_none_or(|s| a.section() == s))
		.ok_or_else(|| AuthzError::UnknownAssertion(key.to_string()))?;
	assertion.check_arity(rule.len())?;
	if let Some(field) = assertion.token_index(PRIORITY_TOKEN) {
		parse_priority(&rule[field])?;
	}
	Ok(())
}

fn parse_priority(value: &str) -> Result<i64> {
	value.trim().parse().map_err(|_| AuthzError::InvalidPriority {
		value: value.to_string(),
	})
}

fn log_loaded(store: &PolicyStore) {
	let counts: Vec<(&str, usize)> = store.keys().map(|key| (key, store.len(key))).collect();
	let total: usize = counts.iter().map(|(_, n)| n).sum();
	info!(rules = total, per_key = ?counts, "loaded policy");
}
