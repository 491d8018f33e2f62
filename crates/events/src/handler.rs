/// Execute an aggregate command in place (decide, then apply every event).
///
/// No persistence or publication happens here; domain unit tests use it to
/// drive an aggregate through several commands. The infra `CommandDispatcher`
/// is the persisted path.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: schoolerp_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
