fn main() {
    std::process::exit(labelscan_lib::run());
}
