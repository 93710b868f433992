use avatar_realtime_utils as utils;

fn main() -> anyhow::Result<()> {
    let inputs = utils::device::list_inputs()?;
    println!("Available inputs:\n{}", inputs);

    let outputs = utils::device::list_outputs()?;
    println!("Available outputs:\n{}", outputs);
    Ok(())
}
