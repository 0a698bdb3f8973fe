fn main() {
    qubes_build_info_helper::initialize();
}
